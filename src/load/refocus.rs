//! `RefocusLoadProcessor`: pushes a Matrix to a Refocus-shaped
//! `POST /samples` endpoint. An additive concrete Load binding (this
//! crate's supplement to spec §4.6's generic contract — see
//! `DESIGN.md`), reusing the same `RemoteClient`/`AppConnectors`/metering
//! machinery as the Extract side.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_connectors::AppConnectors;
use crate::extract::RefocusSample;
use crate::model::{Load, Matrix};
use crate::status::{MeterKind, SystemStatus};

const METER_NAME: &str = "refocus_load";
const SERVICE_CLASS: &str = "refocus";

#[derive(Debug, Default, Deserialize)]
struct PushAck {
    #[serde(default)]
    accepted: bool,
}

#[derive(Serialize)]
struct OutgoingSample<'a> {
    name: &'a str,
    value: f64,
    #[serde(rename = "updatedAt")]
    updated_at: String,
}

/// Pushes `matrix` to every `Load::Refocus` sink in `loads`, in parallel,
/// returning one success flag per sink in input order (spec §4.6).
pub async fn load(
    loads: &[Load],
    matrix: &Matrix,
    connectors: &AppConnectors<RefocusSample>,
    status: &SystemStatus,
) -> Vec<bool> {
    futures::future::join_all(
        loads
            .iter()
            .map(|sink| load_one(sink, matrix, connectors, status)),
    )
    .await
}

async fn load_one(
    sink: &Load,
    matrix: &Matrix,
    connectors: &AppConnectors<RefocusSample>,
    status: &SystemStatus,
) -> bool {
    let Load::Refocus { endpoint_id, id } = sink;

    let (client, _cache) = match connectors.client_and_cache_for(endpoint_id, SERVICE_CLASS) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(sink = id, endpoint = %endpoint_id, error = %e, "no connector for load sink");
            status.meter(METER_NAME, MeterKind::Failure);
            return false;
        }
    };

    if client.authenticate().await.is_err() {
        warn!(sink = id, endpoint = %endpoint_id, "authentication failed for load sink");
        status.meter(METER_NAME, MeterKind::AuthenticationFailure);
        status.meter(METER_NAME, MeterKind::Failure);
        return false;
    }

    let payload: Vec<OutgoingSample> = matrix
        .rows()
        .iter()
        .flatten()
        .map(|t| OutgoingSample {
            name: &t.name,
            value: t.value,
            updated_at: t.time.to_rfc3339(),
        })
        .collect();

    let timer = status.timer(METER_NAME, "push_samples");
    let request = client.post("/samples").json(&payload);
    let result = client
        .execute_with_auth_retry::<PushAck>(request, PushAck::default())
        .await;
    timer.stop();

    match result {
        Ok(ack) if ack.accepted => {
            status.meter(METER_NAME, MeterKind::Success);
            true
        }
        Ok(_) => {
            warn!(sink = id, endpoint = %endpoint_id, "load sink did not accept the push");
            status.meter(METER_NAME, MeterKind::Failure);
            false
        }
        Err(_) => {
            status.meter(METER_NAME, MeterKind::AuthenticationFailure);
            status.meter(METER_NAME, MeterKind::Failure);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, ConnectorRecord, ConnectorRegistry};
    use crate::model::Transmutation;
    use base64::Engine;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connectors(server_uri: &str) -> AppConnectors<RefocusSample> {
        let registry = ConnectorRegistry::new(vec![Connector::from_record(ConnectorRecord {
            id: "e1".into(),
            endpoint: server_uri.to_string(),
            username: "svc".into(),
            password_base64: base64::engine::general_purpose::STANDARD.encode(b"pw"),
            connect_timeout_millis: 2000,
            read_timeout_millis: 2000,
            write_timeout_millis: 2000,
            proxy_host: None,
            proxy_port: None,
        })]);
        AppConnectors::new(registry)
    }

    async fn mount_login_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn accepted_push_is_a_success() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;
        Mock::given(method("POST"))
            .and(path("/samples"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"accepted": true})))
            .mount(&server)
            .await;

        let connectors = connectors(&server.uri());
        let status = SystemStatus::new();
        let matrix = Matrix::new(vec![vec![Transmutation::new(Utc::now(), "cpu.load", 1.0)]]);
        let loads = vec![Load::Refocus {
            endpoint_id: "e1".into(),
            id: "sink-a".into(),
        }];

        let results = load(&loads, &matrix, &connectors, &status).await;
        assert_eq!(results, vec![true]);
    }

    #[tokio::test]
    async fn rejected_push_is_a_failure() {
        let server = MockServer::start().await;
        mount_login_ok(&server).await;
        Mock::given(method("POST"))
            .and(path("/samples"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"accepted": false})))
            .mount(&server)
            .await;

        let connectors = connectors(&server.uri());
        let status = SystemStatus::new();
        let matrix = Matrix::new(vec![vec![Transmutation::new(Utc::now(), "cpu.load", 1.0)]]);
        let loads = vec![Load::Refocus {
            endpoint_id: "e1".into(),
            id: "sink-a".into(),
        }];

        let results = load(&loads, &matrix, &connectors, &status).await;
        assert_eq!(results, vec![false]);
    }

    #[tokio::test]
    async fn missing_connector_is_a_failure_without_panicking() {
        let connectors = connectors("http://127.0.0.1:0");
        let status = SystemStatus::new();
        let matrix = Matrix::empty();
        let loads = vec![Load::Refocus {
            endpoint_id: "unknown".into(),
            id: "sink-a".into(),
        }];

        let results = load(&loads, &matrix, &connectors, &status).await;
        assert_eq!(results, vec![false]);
    }
}
