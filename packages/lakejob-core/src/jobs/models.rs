use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    USql,
    Hive,
    Scope,
}

/// Job lifecycle state reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Accepted,
    Compiling,
    Ended,
    New,
    Queued,
    Running,
    Scheduling,
    Starting,
    Paused,
    WaitingForCapacity,
    Yielded,
    Finalizing,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// `Ended` is the only state a job never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ended)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Accepted => "Accepted",
            JobState::Compiling => "Compiling",
            JobState::Ended => "Ended",
            JobState::New => "New",
            JobState::Queued => "Queued",
            JobState::Running => "Running",
            JobState::Scheduling => "Scheduling",
            JobState::Starting => "Starting",
            JobState::Paused => "Paused",
            JobState::WaitingForCapacity => "WaitingForCapacity",
            JobState::Yielded => "Yielded",
            JobState::Finalizing => "Finalizing",
            JobState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Outcome of a job once it has ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    #[default]
    None,
    Succeeded,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobResult::None => "None",
            JobResult::Succeeded => "Succeeded",
            JobResult::Cancelled => "Cancelled",
            JobResult::Failed => "Failed",
            JobResult::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Language-specific job properties. Only the script is required on submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProperties {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
}

/// Error detail attached to failed jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorDetails {
    #[serde(default)]
    pub error_id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Job description sent on submit and returned, with server fields filled in, on get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInformation {
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub properties: JobProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_of_parallelism: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    // Server-populated fields; never sent on submit
    #[serde(default, skip_serializing)]
    pub job_id: Option<Uuid>,
    #[serde(default, skip_serializing)]
    pub submitter: Option<String>,
    #[serde(default, skip_serializing)]
    pub state: Option<JobState>,
    #[serde(default, skip_serializing)]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing)]
    pub submit_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing)]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing)]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing)]
    pub error_message: Option<Vec<JobErrorDetails>>,
}

impl JobInformation {
    /// A U-SQL job with the given name and script
    pub fn usql(name: &str, script: &str) -> Self {
        Self {
            name: name.to_string(),
            job_type: JobType::USql,
            properties: JobProperties {
                job_type: JobType::USql,
                script: script.to_string(),
                runtime_version: None,
            },
            degree_of_parallelism: None,
            priority: None,
            job_id: None,
            submitter: None,
            state: None,
            result: None,
            submit_time: None,
            start_time: None,
            end_time: None,
            error_message: None,
        }
    }

    pub fn with_parallelism(mut self, degree: u32) -> Self {
        self.degree_of_parallelism = Some(degree);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Current state, `Unknown` if the service omitted it
    pub fn state(&self) -> JobState {
        self.state.unwrap_or(JobState::Unknown)
    }

    pub fn is_ended(&self) -> bool {
        self.state().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_body_omits_server_fields() {
        let info = JobInformation::usql("HelloWorld", "@a = SELECT 1;").with_parallelism(2);
        let body = serde_json::to_value(&info).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "HelloWorld",
                "type": "USql",
                "properties": {"type": "USql", "script": "@a = SELECT 1;"},
                "degreeOfParallelism": 2
            })
        );
    }

    #[test]
    fn test_parse_service_response() {
        let info: JobInformation = serde_json::from_value(json!({
            "jobId": "6f1c2ea8-0f4e-4c41-9c53-0f1a3a0b1d2e",
            "name": "HelloWorld",
            "type": "USql",
            "submitter": "user@contoso.com",
            "degreeOfParallelism": 1,
            "priority": 1000,
            "submitTime": "2024-01-05T10:00:00.000Z",
            "state": "Ended",
            "result": "Succeeded",
            "properties": {"type": "USql", "script": "...", "runtimeVersion": "default", "totalCompilationTime": "PT1S"},
            "errorMessage": []
        }))
        .unwrap();

        assert!(info.is_ended());
        assert_eq!(info.result, Some(JobResult::Succeeded));
        assert_eq!(info.priority, Some(1000));
        assert_eq!(info.properties.runtime_version.as_deref(), Some("default"));
        assert!(info.submit_time.is_some());
    }

    #[test]
    fn test_unrecognized_values_map_to_unknown() {
        let state: JobState = serde_json::from_value(json!("Hibernating")).unwrap();
        assert_eq!(state, JobState::Unknown);
        assert!(!state.is_terminal());
        let result: JobResult = serde_json::from_value(json!("PartiallySucceeded")).unwrap();
        assert_eq!(result, JobResult::Unknown);
        assert_eq!(JobState::WaitingForCapacity.to_string(), "WaitingForCapacity");
    }
}
