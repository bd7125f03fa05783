// SPDX-License-Identifier: Apache-2.0

//! The AI side of conda-assist: package search and conda error explanations.
//!
//! Requests go through a [`ChatBackend`]. [`AnacondaClient`] talks to the
//! Anaconda Assistant API; tests substitute their own backend. Failed conda
//! commands reach the explainer through a handler passed to
//! [`CondaWrapper`], never through process-wide state.

use crate::conda::CondaRunner;
use crate::error::{AssistError, ManagerError};
use crate::settings::{self, AssistantSettings, DebugErrorMode, Settings};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "ANACONDA_ASSISTANT_API_KEY";

/// Consent prompts are answered and retried at most this many times.
pub const MAX_ATTEMPTS: usize = 5;

pub const TERMS_PROMPT: &str = "\
You have not accepted the terms of service.
You must accept our terms of service

  https://legal.anaconda.com/policies/en/?name=terms-of-service#anaconda-terms-of-service

and Privacy Policy

  https://legal.anaconda.com/policies/en/?name=privacy-policy

Are you more than 13 years old and accept the terms?";

pub const DATA_COLLECTION_PROMPT: &str = "\
You have not chosen to opt-in or opt-out of data collection.
This does not affect the operation of Anaconda Assistant, but your choice is required to proceed.

If you opt-in you will enjoy personalized recommendations and contribute to smarter features.
Your data is never sold and this setting only affects the data Anaconda stores.

Would you like to opt-in to data collection?";

// =============================================================================
// Chat backend
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

pub trait ChatBackend {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistError>;
}

/// Some models ignore system messages, so `combine` folds the instructions
/// into a single user message.
pub fn build_messages(system: &str, prompt: &str, combine: bool) -> Vec<ChatMessage> {
    if combine {
        vec![ChatMessage::user(format!("{}\n{}", system, prompt))]
    } else {
        vec![ChatMessage::system(system), ChatMessage::user(prompt)]
    }
}

/// Refuses to talk to the API until the user has made both choices.
pub fn check_terms(settings: &AssistantSettings) -> Result<(), AssistError> {
    match settings.accepted_terms {
        None => return Err(AssistError::UnspecifiedAcceptedTerms),
        Some(false) => return Err(AssistError::NotAcceptedTerms),
        Some(true) => {}
    }
    if settings.data_collection.is_none() {
        return Err(AssistError::UnspecifiedDataCollection);
    }
    Ok(())
}

/// Pulls the reply text out of a chat-completions style response.
pub fn extract_content(value: &Value) -> Option<String> {
    let text = value
        .pointer("/choices/0/message/content")
        .or_else(|| value.get("content"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)?
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// HTTP client for the Anaconda Assistant chat endpoint.
pub struct AnacondaClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    client_source: String,
    api_version: String,
    model: Option<String>,
    api_key: String,
}

impl AnacondaClient {
    pub fn from_settings(settings: &AssistantSettings) -> Result<Self, AssistError> {
        check_terms(settings)?;
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| settings.api_key.clone())
            .ok_or(AssistError::MissingApiKey)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "https://{}/{}/chat/completions",
                settings.domain.trim_end_matches('/'),
                settings.api_version
            ),
            client_source: settings.client_source.clone(),
            api_version: settings.api_version.clone(),
            model: settings.model.clone(),
            api_key,
        })
    }
}

impl ChatBackend for AnacondaClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistError> {
        let mut body = json!({ "messages": messages, "stream": false });
        if let Some(model) = &self.model {
            body["model"] = json!(model);
        }

        tracing::debug!(endpoint = %self.endpoint, messages = messages.len(), "assistant request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Client-Source", &self.client_source)
            .header("X-Client-Version", &self.api_version)
            .header(USER_AGENT, format!("conda-assist/{}", env!("CARGO_PKG_VERSION")))
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AssistError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = response.json()?;
        extract_content(&value).ok_or(AssistError::EmptyResponse)
    }
}

/// Sends one prompt with the given system message.
pub fn ask(
    backend: &dyn ChatBackend,
    settings: &AssistantSettings,
    system: &str,
    prompt: &str,
) -> Result<String, AssistError> {
    backend.complete(&build_messages(system, prompt, settings.combine_messages))
}

pub fn search(
    backend: &dyn ChatBackend,
    settings: &AssistantSettings,
    query: &str,
) -> Result<String, AssistError> {
    ask(backend, settings, &settings.system_messages.search, query)
}

// =============================================================================
// Consent
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Terms,
    DataCollection,
}

impl Consent {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Terms => TERMS_PROMPT,
            Self::DataCollection => DATA_COLLECTION_PROMPT,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Self::Terms => "assistant.accepted_terms",
            Self::DataCollection => "assistant.data_collection",
        }
    }
}

/// Runs `action` with freshly loaded settings, asking for missing consent
/// in between attempts.
///
/// `answer` returns `None` when nobody can be asked (no terminal), which
/// gives up with the original error. Answers are saved to `config_path`.
pub fn with_consent<T>(
    config_path: &Path,
    mut answer: impl FnMut(Consent) -> Option<bool>,
    mut action: impl FnMut(&Settings) -> Result<T, AssistError>,
) -> Result<T, AssistError> {
    let mut last = AssistError::UnspecifiedAcceptedTerms;
    for attempt in 1..=MAX_ATTEMPTS {
        let settings = Settings::load(config_path)?;
        let consent = match action(&settings) {
            Ok(value) => return Ok(value),
            Err(AssistError::UnspecifiedAcceptedTerms) => Consent::Terms,
            Err(AssistError::UnspecifiedDataCollection) => Consent::DataCollection,
            Err(e) => return Err(e),
        };
        tracing::debug!(attempt, ?consent, "asking for consent");
        last = match consent {
            Consent::Terms => AssistError::UnspecifiedAcceptedTerms,
            Consent::DataCollection => AssistError::UnspecifiedDataCollection,
        };
        let Some(choice) = answer(consent) else {
            return Err(last);
        };
        settings::set_value(config_path, consent.key(), &choice.to_string())?;
        if consent == Consent::Terms && !choice {
            return Err(AssistError::NotAcceptedTerms);
        }
    }
    Err(last)
}

// =============================================================================
// Error explanations
// =============================================================================

/// Subcommands whose failures are worth explaining.
pub const EXPLAINED_COMMANDS: &[&str] = &[
    "create",
    "install",
    "remove",
    "uninstall",
    "update",
    "env create",
    "env update",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub command: String,
    pub message: String,
    pub return_code: i32,
}

impl ErrorReport {
    pub fn prompt(&self) -> String {
        format!("COMMAND:\n{}\nMESSAGE:\n{}", self.command, self.message)
    }
}

/// Drops the directory part of the conda executable so the report reads
/// `conda install ...` whatever the install location.
pub fn clean_command(command: &str) -> String {
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some(first) if first.ends_with("conda") || first.ends_with("conda.exe") => {
            std::iter::once("conda").chain(parts).collect::<Vec<_>>().join(" ")
        }
        _ => command.to_string(),
    }
}

pub fn is_explained_command(args: &[String]) -> bool {
    let words: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with('-'))
        .take(2)
        .collect();
    let Some(first) = words.first() else {
        return false;
    };
    let pair = words.join(" ");
    EXPLAINED_COMMANDS.iter().any(|c| *c == *first || *c == pair)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainDecision {
    Skip,
    Ask,
    Explain,
}

pub fn explain_decision(settings: &AssistantSettings, report: &ErrorReport) -> ExplainDecision {
    if report.return_code == 0 || !settings.suggest_correction_on_error {
        return ExplainDecision::Skip;
    }
    match settings.debug_error_mode {
        DebugErrorMode::Off => ExplainDecision::Skip,
        DebugErrorMode::Ask => ExplainDecision::Ask,
        DebugErrorMode::Automatic => ExplainDecision::Explain,
    }
}

pub fn explain_error(
    backend: &dyn ChatBackend,
    settings: &AssistantSettings,
    report: &ErrorReport,
) -> Result<String, AssistError> {
    ask(backend, settings, &settings.system_messages.error, &report.prompt())
}

/// Sentence shown after `configure` picks a mode.
pub fn mode_message(mode: DebugErrorMode) -> String {
    let what = match mode {
        DebugErrorMode::Automatic => "Assistant will automatically provide solutions.",
        DebugErrorMode::Ask => "Assistant will ask if you want help when you encounter errors.",
        DebugErrorMode::Off => "Assistant will not provide help with conda errors.",
    };
    format!("{} To change your selection, run `conda-assist configure`", what)
}

// =============================================================================
// Conda wrapper
// =============================================================================

/// Runs a user's conda command and hands failures to an injected handler.
pub struct CondaWrapper<'a> {
    runner: &'a dyn CondaRunner,
    on_error: Option<Box<dyn FnMut(&ErrorReport) + 'a>>,
    after_search: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> CondaWrapper<'a> {
    pub fn new(runner: &'a dyn CondaRunner) -> Self {
        Self {
            runner,
            on_error: None,
            after_search: None,
        }
    }

    /// Called with the report of a failed command from [`EXPLAINED_COMMANDS`].
    pub fn on_error(mut self, handler: impl FnMut(&ErrorReport) + 'a) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Called after a successful `conda search`.
    pub fn after_search(mut self, hook: impl FnMut() + 'a) -> Self {
        self.after_search = Some(Box::new(hook));
        self
    }

    /// Runs conda and returns its exit code.
    pub fn run(&mut self, args: &[String]) -> Result<i32, ManagerError> {
        let output = self.runner.passthrough(args)?;
        if !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        if !output.stderr.is_empty() {
            eprint!("{}", output.stderr);
        }

        if output.status != 0 && is_explained_command(args) {
            let exe = self
                .runner
                .executable()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| "conda".to_string());
            let report = ErrorReport {
                command: clean_command(&format!("{} {}", exe, args.join(" "))),
                message: output.stderr.trim().to_string(),
                return_code: output.status,
            };
            tracing::debug!(
                command = %report.command,
                code = report.return_code,
                "conda command failed"
            );
            if let Some(handler) = self.on_error.as_mut() {
                handler(&report);
            }
        } else if output.status == 0 && args.first().is_some_and(|a| a == "search") {
            if let Some(hook) = self.after_search.as_mut() {
                hook();
            }
        }
        Ok(output.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use std::cell::RefCell;

    struct Canned {
        reply: &'static str,
        seen: RefCell<Vec<Vec<ChatMessage>>>,
    }

    impl Canned {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for Canned {
        fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistError> {
            self.seen.borrow_mut().push(messages.to_vec());
            Ok(self.reply.to_string())
        }
    }

    fn consented() -> AssistantSettings {
        AssistantSettings {
            accepted_terms: Some(true),
            data_collection: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_terms_gate() {
        let mut settings = AssistantSettings::default();
        assert!(matches!(check_terms(&settings), Err(AssistError::UnspecifiedAcceptedTerms)));
        settings.accepted_terms = Some(false);
        assert!(matches!(check_terms(&settings), Err(AssistError::NotAcceptedTerms)));
        settings.accepted_terms = Some(true);
        assert!(matches!(check_terms(&settings), Err(AssistError::UnspecifiedDataCollection)));
        settings.data_collection = Some(true);
        assert!(check_terms(&settings).is_ok());
    }

    #[test]
    fn test_combine_messages() {
        let split = build_messages("SYS", "hello", false);
        assert_eq!(split, vec![ChatMessage::system("SYS"), ChatMessage::user("hello")]);
        let combined = build_messages("SYS", "hello", true);
        assert_eq!(combined, vec![ChatMessage::user("SYS\nhello")]);
    }

    #[test]
    fn test_extract_content() {
        let reply = json!({
            "choices": [{"message": {"role": "assistant", "content": " try numpy "}}]
        });
        assert_eq!(extract_content(&reply).as_deref(), Some("try numpy"));
        assert_eq!(extract_content(&json!({"content": "plain"})).as_deref(), Some("plain"));
        assert!(extract_content(&json!({"choices": []})).is_none());
        assert!(extract_content(&json!({"content": "   "})).is_none());
    }

    #[test]
    fn test_search_uses_search_system_message() {
        let backend = Canned::new("Try `pandas`.");
        let settings = consented();
        let answer = search(&backend, &settings, "dataframes").unwrap();
        assert_eq!(answer, "Try `pandas`.");
        let seen = backend.seen.borrow();
        assert_eq!(seen[0][0].content, settings.system_messages.search);
        assert_eq!(seen[0][1].content, "dataframes");
    }

    #[test]
    fn test_error_prompt_and_clean_command() {
        assert_eq!(clean_command("/opt/miniconda3/bin/conda install nump"), "conda install nump");
        assert_eq!(clean_command("mamba install x"), "mamba install x");

        let report = ErrorReport {
            command: "conda install nump".into(),
            message: "PackagesNotFoundError: nump".into(),
            return_code: 1,
        };
        assert_eq!(
            report.prompt(),
            "COMMAND:\nconda install nump\nMESSAGE:\nPackagesNotFoundError: nump"
        );

        let backend = Canned::new("Did you mean numpy?");
        let settings = consented();
        explain_error(&backend, &settings, &report).unwrap();
        assert_eq!(backend.seen.borrow()[0][0].content, settings.system_messages.error);
    }

    #[test]
    fn test_explained_commands() {
        let args = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert!(is_explained_command(&args("install numpy")));
        assert!(is_explained_command(&args("env create -f environment.yml")));
        assert!(is_explained_command(&args("--yes remove scipy")));
        assert!(!is_explained_command(&args("env list")));
        assert!(!is_explained_command(&args("search numpy")));
        assert!(!is_explained_command(&[]));
    }

    #[test]
    fn test_explain_decision() {
        let report = ErrorReport {
            command: "conda install x".into(),
            message: "boom".into(),
            return_code: 1,
        };
        let mut settings = consented();
        assert_eq!(explain_decision(&settings, &report), ExplainDecision::Ask);
        settings.debug_error_mode = DebugErrorMode::Automatic;
        assert_eq!(explain_decision(&settings, &report), ExplainDecision::Explain);
        settings.suggest_correction_on_error = false;
        assert_eq!(explain_decision(&settings, &report), ExplainDecision::Skip);
        settings.suggest_correction_on_error = true;
        settings.debug_error_mode = DebugErrorMode::Off;
        assert_eq!(explain_decision(&settings, &report), ExplainDecision::Skip);
    }

    #[test]
    fn test_wrapper_calls_injected_handler() {
        let fake = FakeConda::failing("install");
        let mut reports = Vec::new();
        let code = CondaWrapper::new(&fake)
            .on_error(|r| reports.push(r.clone()))
            .run(&["install".to_string(), "nump".to_string()])
            .unwrap();
        assert_eq!(code, 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].command, "conda install nump");
        assert_eq!(reports[0].message, "simulated install failure");
    }

    #[test]
    fn test_wrapper_search_hint_and_ignored_failures() {
        let fake = FakeConda::default();
        let mut hints = 0;
        CondaWrapper::new(&fake)
            .after_search(|| hints += 1)
            .run(&["search".to_string(), "numpy".to_string()])
            .unwrap();
        assert_eq!(hints, 1);

        let fake = FakeConda::failing("config");
        let mut called = false;
        let code = CondaWrapper::new(&fake)
            .on_error(|_| called = true)
            .run(&["config".to_string(), "--show".to_string()])
            .unwrap();
        assert_eq!(code, 1);
        assert!(!called);
    }

    #[test]
    fn test_with_consent_saves_answers_and_retries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut asked = Vec::new();
        let answer = with_consent(
            &path,
            |consent| {
                asked.push(consent);
                Some(true)
            },
            |settings| {
                check_terms(&settings.assistant)?;
                Ok("done")
            },
        )
        .unwrap();
        assert_eq!(answer, "done");
        assert_eq!(asked, vec![Consent::Terms, Consent::DataCollection]);

        let saved = Settings::load(&path).unwrap();
        assert_eq!(saved.assistant.accepted_terms, Some(true));
        assert_eq!(saved.assistant.data_collection, Some(true));
    }

    #[test]
    fn test_with_consent_gives_up() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let gate = |s: &Settings| check_terms(&s.assistant);

        let err = with_consent(&path, |_| None, gate).unwrap_err();
        assert!(matches!(err, AssistError::UnspecifiedAcceptedTerms));

        let err = with_consent(&path, |_| Some(false), gate).unwrap_err();
        assert!(matches!(err, AssistError::NotAcceptedTerms));
    }
}
