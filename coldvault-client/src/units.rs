//! Unit-related API endpoints

use async_trait::async_trait;
use coldvault_core::domain::unit::{TargetState, UnitState};
use coldvault_core::dto::unit::{SetDesiredState, UnitStatePage};
use tracing::debug;

use crate::FleetClient;
use crate::error::{ClientError, Result};

/// The subset of the fleet API the backup agent depends on
#[async_trait]
pub trait UnitApi: Send + Sync {
    /// Fetches the state of every unit known to the scheduler
    ///
    /// No caching: every call goes to the scheduler.
    async fn unit_states(&self) -> Result<Vec<UnitState>>;

    /// Requests a new desired state for a unit
    ///
    /// Success means fleet accepted the request, not that the unit has
    /// reached the state.
    ///
    /// # Arguments
    /// * `name` - Unit name (e.g., "neo4j-red@1.service")
    /// * `target` - Desired state
    async fn set_unit_target_state(&self, name: &str, target: TargetState) -> Result<()>;
}

#[async_trait]
impl UnitApi for FleetClient {
    async fn unit_states(&self) -> Result<Vec<UnitState>> {
        let url = format!("{}/fleet/v1/state", self.base_url);
        let mut states = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("nextPageToken", token)]);
            }

            let response = request.send().await?;
            let page: UnitStatePage = self.handle_response(response).await?;

            debug!("Fetched {} unit state(s) from fleet", page.states.len());
            states.extend(page.states.into_iter().map(UnitState::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if page_token.as_deref() == Some(token.as_str()) {
                        return Err(ClientError::ParseError(format!(
                            "fleet returned page token {} twice",
                            token
                        )));
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(states)
    }

    async fn set_unit_target_state(&self, name: &str, target: TargetState) -> Result<()> {
        let url = format!("{}/fleet/v1/units/{}", self.base_url, name);
        let response = self
            .client
            .put(&url)
            .json(&SetDesiredState {
                name: name.to_string(),
                desired_state: target,
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use coldvault_core::domain::unit::ActiveState;
    use coldvault_core::dto::unit::UnitStateRecord;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn spawn_fleet(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn record(name: &str, active: &str) -> UnitStateRecord {
        UnitStateRecord {
            name: name.to_string(),
            systemd_active_state: active.to_string(),
            systemd_load_state: "loaded".to_string(),
            ..Default::default()
        }
    }

    async fn paged_states(Query(params): Query<HashMap<String, String>>) -> Json<UnitStatePage> {
        let page = match params.get("nextPageToken").map(String::as_str) {
            None => UnitStatePage {
                states: vec![record("deployer.service", "inactive")],
                next_page_token: Some("2".to_string()),
            },
            Some("2") => UnitStatePage {
                states: vec![
                    record("neo4j-red@1.service", "active"),
                    record("ingester.service", "failed"),
                ],
                next_page_token: None,
            },
            Some(_) => UnitStatePage::default(),
        };
        Json(page)
    }

    #[tokio::test]
    async fn test_unit_states_follows_pagination() {
        let app = Router::new().route("/fleet/v1/state", get(paged_states));
        let client = FleetClient::new(spawn_fleet(app).await).unwrap();

        let states = client.unit_states().await.unwrap();
        let names: Vec<_> = states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["deployer.service", "neo4j-red@1.service", "ingester.service"]
        );
        assert_eq!(states[0].active_state, ActiveState::Inactive);
        assert_eq!(states[1].active_state, ActiveState::Active);
        assert_eq!(
            states[2].active_state,
            ActiveState::Unknown("failed".to_string())
        );
    }

    #[tokio::test]
    async fn test_repeated_page_token_stops_pagination() {
        let app = Router::new().route(
            "/fleet/v1/state",
            get(|| async {
                Json(UnitStatePage {
                    states: vec![record("deployer.service", "inactive")],
                    next_page_token: Some("stuck".to_string()),
                })
            }),
        );
        let client = FleetClient::new(spawn_fleet(app).await).unwrap();

        let err = client.unit_states().await.unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn test_set_unit_target_state_sends_desired_state() {
        type Seen = Arc<Mutex<Vec<(String, SetDesiredState)>>>;

        async fn record_put(
            State(seen): State<Seen>,
            Path(name): Path<String>,
            Json(body): Json<SetDesiredState>,
        ) -> StatusCode {
            seen.lock().unwrap().push((name, body));
            StatusCode::NO_CONTENT
        }

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/fleet/v1/units/{name}", put(record_put))
            .with_state(seen.clone());
        let client = FleetClient::new(spawn_fleet(app).await).unwrap();

        client
            .set_unit_target_state("neo4j-red@1.service", TargetState::Inactive)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "neo4j-red@1.service");
        assert_eq!(seen[0].1.name, "neo4j-red@1.service");
        assert_eq!(seen[0].1.desired_state, TargetState::Inactive);
    }

    #[tokio::test]
    async fn test_error_status_is_not_connectivity() {
        let app = Router::new().route(
            "/fleet/v1/units/{name}",
            put(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "etcd unavailable") }),
        );
        let client = FleetClient::new(spawn_fleet(app).await).unwrap();

        let err = client
            .set_unit_target_state("neo4j-red@1.service", TargetState::Launched)
            .await
            .unwrap_err();

        assert!(err.is_server_error());
        assert!(!err.is_connectivity());
        assert!(err.to_string().contains("etcd unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let app = Router::new().route("/fleet/v1/state", get(|| async { "not json" }));
        let client = FleetClient::new(spawn_fleet(app).await).unwrap();

        let err = client.unit_states().await.unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn test_unreachable_fleet_is_connectivity() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = FleetClient::new(format!("http://{}", addr)).unwrap();
        let err = client.unit_states().await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
