//! Клиент REST API сервера трекинга (версия 2.0)

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::tracking::file_store::{local_artifact_root, write_local_artifact};
use crate::tracking::store::{
    validate_artifact_path, Experiment, Metric, RunInfo, RunStatus, TrackingStore,
};

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const PROXIED_ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

pub struct RestStore {
    base_url: String,
    token: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentDto,
}

#[derive(Debug, Deserialize)]
struct ExperimentDto {
    experiment_id: String,
    name: String,
    #[serde(default)]
    lifecycle_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunDto,
}

#[derive(Debug, Deserialize)]
struct RunDto {
    info: RunInfoDto,
}

#[derive(Debug, Deserialize)]
struct RunInfoDto {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
    artifact_uri: String,
    #[serde(default)]
    start_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: Option<String>,
}

/// Пустой ответ `{}`
#[derive(Debug, Deserialize)]
struct Empty {}

impl RestStore {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("a23-ml/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Tracking(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, token, client))
    }

    /// Хранилище поверх заранее настроенного клиента
    pub fn with_client(base_url: &str, token: Option<&str>, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, endpoint)
    }

    /// URL загрузки артефакта через прокси сервера.
    /// `mlflow-artifacts:/1/<run>/artifacts` + `model/MLmodel`
    /// -> `<base>/api/2.0/mlflow-artifacts/artifacts/1/<run>/artifacts/model/MLmodel`
    pub fn proxied_artifact_url(&self, artifact_uri: &str, artifact_path: &str) -> Option<String> {
        let rest = artifact_uri.strip_prefix(PROXIED_ARTIFACT_SCHEME)?;
        // Вариант с хостом: mlflow-artifacts://host:port/path
        let path = match rest.strip_prefix("//") {
            Some(with_host) => with_host.split_once('/').map_or("", |(_, p)| p),
            None => rest,
        };
        let path = path.trim_matches('/');
        Some(if path.is_empty() {
            format!("{}/{}/{}", self.base_url, ARTIFACTS_PREFIX, artifact_path)
        } else {
            format!("{}/{}/{}/{}", self.base_url, ARTIFACTS_PREFIX, path, artifact_path)
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .map_err(|source| PipelineError::Connection {
                uri: self.base_url.clone(),
                source,
            })?;
        tracing::debug!("{} -> {}", endpoint, response.status());
        Ok(response)
    }

    fn decode<R: DeserializeOwned>(&self, response: Response, endpoint: &str) -> Result<R> {
        let status = response.status();
        let body = response.text().map_err(|source| PipelineError::Connection {
            uri: self.base_url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(PipelineError::Server {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let request = self.client.post(self.endpoint_url(endpoint)).json(body);
        let response = self.send(request, endpoint)?;
        self.decode(response, endpoint)
    }

    fn find_experiment(&self, name: &str) -> Result<Option<ExperimentDto>> {
        let endpoint = "experiments/get-by-name";
        let request = self
            .client
            .get(self.endpoint_url(endpoint))
            .query(&[("experiment_name", name)]);
        let response = self.send(request, endpoint)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let code = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_code);
            if code.as_deref() == Some("RESOURCE_DOES_NOT_EXIST") {
                return Ok(None);
            }
            return Err(PipelineError::Server {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                body,
            });
        }

        let found: GetExperimentResponse = self.decode(response, endpoint)?;
        Ok(Some(found.experiment))
    }
}

impl TrackingStore for RestStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        if let Some(found) = self.find_experiment(name)? {
            if let Some(stage) = found.lifecycle_stage.as_deref().filter(|s| *s != "active") {
                return Err(PipelineError::Tracking(format!(
                    "experiment {name:?} exists but is {stage}"
                )));
            }
            return Ok(Experiment {
                experiment_id: found.experiment_id,
                name: found.name,
            });
        }

        let created: CreateExperimentResponse =
            self.post("experiments/create", &serde_json::json!({ "name": name }))?;
        tracing::info!("Created experiment {:?} with id {}", name, created.experiment_id);
        Ok(Experiment {
            experiment_id: created.experiment_id,
            name: name.to_string(),
        })
    }

    fn create_run(
        &self,
        experiment: &Experiment,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[(String, String)],
    ) -> Result<RunInfo> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(key, value)| Tag { key, value })
            .collect();
        let mut body = serde_json::json!({
            "experiment_id": experiment.experiment_id,
            "start_time": start_time,
            "tags": tags,
        });
        if let Some(name) = run_name {
            body["run_name"] = serde_json::Value::from(name);
        }

        let created: CreateRunResponse = self.post("runs/create", &body)?;
        let info = created.run.info;
        Ok(RunInfo {
            run_name: info.run_name.unwrap_or_else(|| info.run_id.clone()),
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
            start_time: info.start_time.unwrap_or(start_time),
            status: RunStatus::Running,
        })
    }

    fn log_param(&self, run: &RunInfo, key: &str, value: &str) -> Result<()> {
        let _: Empty = self.post(
            "runs/log-parameter",
            &serde_json::json!({ "run_id": run.run_id, "key": key, "value": value }),
        )?;
        Ok(())
    }

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> Result<()> {
        let _: Empty = self.post(
            "runs/log-metric",
            &serde_json::json!({
                "run_id": run.run_id,
                "key": metric.key,
                "value": metric.value,
                "timestamp": metric.timestamp,
                "step": metric.step,
            }),
        )?;
        Ok(())
    }

    fn log_artifact(&self, run: &RunInfo, artifact_path: &str, contents: &[u8]) -> Result<()> {
        validate_artifact_path(artifact_path)?;

        if let Some(url) = self.proxied_artifact_url(&run.artifact_uri, artifact_path) {
            let endpoint = "mlflow-artifacts/artifacts";
            let request = self.client.put(url).body(contents.to_vec());
            let response = self.send(request, endpoint)?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::Server {
                    status: status.as_u16(),
                    endpoint: endpoint.to_string(),
                    body: response.text().unwrap_or_default(),
                });
            }
            return Ok(());
        }

        // Сервер без прокси артефактов: каталог должен быть доступен локально
        match local_artifact_root(&run.artifact_uri) {
            Some(root) => write_local_artifact(&root, artifact_path, contents),
            None => Err(PipelineError::Tracking(format!(
                "unsupported artifact URI {:?}",
                run.artifact_uri
            ))),
        }
    }

    fn update_run(&self, run: &RunInfo, status: RunStatus, end_time: i64) -> Result<()> {
        let _: Empty = self.post(
            "runs/update",
            &serde_json::json!({
                "run_id": run.run_id,
                "status": status.as_str(),
                "end_time": end_time,
            }),
        )?;
        Ok(())
    }
}
