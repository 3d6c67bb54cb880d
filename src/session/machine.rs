//! Conversation state machine for one user.
//!
//! [`Session::handle`] maps an inbound event to replies and at most one awaitable
//! [`Operation`]. The driver performs the operation and feeds the result back through
//! [`Session::complete`]. Neither method performs I/O.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::card::{BuildError, GeneratedCard, StyleId};
use crate::llm::media::is_supported_image;
use crate::llm::ports::{AnalysisError, GenerationError};
use crate::product::ProductRecord;
use crate::session::messages;
use crate::session::photo::SessionPhoto;

pub const CHOICE_FROM_TEXT: &str = "input:text";
pub const CHOICE_FROM_PHOTO: &str = "input:photo";
pub const CHOICE_CONFIRM: &str = "confirm:yes";
pub const CHOICE_REVISE: &str = "confirm:revise";
pub const CHOICE_NEW_CARD: &str = "menu:new";
pub const STYLE_CHOICE_PREFIX: &str = "style:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingInputChoice,
    AwaitingTextDescription,
    AwaitingPhoto,
    AwaitingConfirmation,
    AwaitingStyleChoice,
    Generating,
    Delivered,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingInputChoice => "awaiting_input_choice",
            SessionState::AwaitingTextDescription => "awaiting_text_description",
            SessionState::AwaitingPhoto => "awaiting_photo",
            SessionState::AwaitingConfirmation => "awaiting_confirmation",
            SessionState::AwaitingStyleChoice => "awaiting_style_choice",
            SessionState::Generating => "generating",
            SessionState::Delivered => "delivered",
        }
    }
}

/// Which input path produced the draft; `revise` returns there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Text,
    Photo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Cancel,
    Text(String),
    Photo {
        bytes: Vec<u8>,
        caption: Option<String>,
    },
    Button(String),
    UnsupportedMedia,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Cancel => "cancel",
            Event::Text(_) => "text",
            Event::Photo { .. } => "photo",
            Event::Button(_) => "button",
            Event::UnsupportedMedia => "unsupported_media",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("empty text")]
    EmptyText,
    #[error("unsupported media")]
    UnsupportedMedia,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Choice {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    ChoicePrompt { text: String, options: Vec<Choice> },
    Image { path: PathBuf, caption: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhotoSource {
    /// Freshly received bytes, not yet stored for the session.
    Upload(Vec<u8>),
    /// The photo the session already holds.
    Held(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AnalyzeText {
        description: String,
    },
    AnalyzeImage {
        photo: PhotoSource,
        caption: Option<String>,
    },
    BuildCard {
        record: ProductRecord,
        style: String,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AnalyzeText { .. } => "analyze_text",
            Operation::AnalyzeImage { .. } => "analyze_image",
            Operation::BuildCard { .. } => "build_card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug)]
pub enum Outcome {
    Analyzed {
        result: Result<ProductRecord, AnalysisError>,
        /// Upload stored for this analysis; adopted by the session on success.
        photo: Option<SessionPhoto>,
    },
    Built {
        result: Result<GeneratedCard, CardError>,
        /// Product image generated for a draft that had none.
        generated_photo: Option<SessionPhoto>,
    },
}

#[derive(Debug, Default)]
pub struct Step {
    pub outbound: Vec<Outbound>,
    pub operation: Option<Operation>,
    pub rejected: Option<InputError>,
}

impl Step {
    fn reply(outbound: Vec<Outbound>) -> Self {
        Step {
            outbound,
            ..Step::default()
        }
    }

    fn run(notice: &str, operation: Operation) -> Self {
        Step {
            outbound: vec![Outbound::Text(notice.to_string())],
            operation: Some(operation),
            rejected: None,
        }
    }

    fn reject(error: InputError) -> Self {
        let text = match error {
            InputError::EmptyText => messages::EMPTY_TEXT,
            InputError::UnsupportedMedia => messages::UNSUPPORTED_MEDIA,
        };
        Step {
            outbound: vec![Outbound::Text(text.to_string())],
            operation: None,
            rejected: Some(error),
        }
    }
}

fn input_choice_prompt(text: &str) -> Outbound {
    Outbound::ChoicePrompt {
        text: text.to_string(),
        options: vec![
            Choice::new(CHOICE_FROM_TEXT, messages::BUTTON_FROM_TEXT),
            Choice::new(CHOICE_FROM_PHOTO, messages::BUTTON_FROM_PHOTO),
        ],
    }
}

fn confirm_prompt(text: String) -> Outbound {
    Outbound::ChoicePrompt {
        text,
        options: vec![
            Choice::new(CHOICE_CONFIRM, messages::BUTTON_CONFIRM),
            Choice::new(CHOICE_REVISE, messages::BUTTON_REVISE),
        ],
    }
}

fn style_prompt(text: &str) -> Outbound {
    let styles: Vec<String> = StyleId::ALL
        .iter()
        .map(|style| format!("{}: {}", style.title(), style.description()))
        .collect();
    Outbound::ChoicePrompt {
        text: format!("{text}\n\n{}", styles.join("\n")),
        options: StyleId::ALL
            .iter()
            .map(|style| Choice::new(format!("{STYLE_CHOICE_PREFIX}{style}"), style.title()))
            .collect(),
    }
}

fn new_card_prompt(text: &str) -> Outbound {
    Outbound::ChoicePrompt {
        text: text.to_string(),
        options: vec![Choice::new(CHOICE_NEW_CARD, messages::BUTTON_NEW_CARD)],
    }
}

fn analysis_failure_text(error: &AnalysisError, source: InputSource) -> &'static str {
    match (error, source) {
        (AnalysisError::Timeout, _) => messages::ANALYSIS_TIMEOUT,
        (AnalysisError::RemoteError(_), _) => messages::ANALYSIS_REMOTE,
        (AnalysisError::ParseFailure(_), InputSource::Text) => messages::ANALYSIS_PARSE,
        (AnalysisError::ParseFailure(_), InputSource::Photo) => messages::PHOTO_PARSE,
    }
}

/// One user in one chat. Private chats have `chat_id == user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: i64,
    pub user_id: u64,
}

impl SessionKey {
    pub fn new(chat_id: i64, user_id: u64) -> Self {
        SessionKey { chat_id, user_id }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chat_id, self.user_id)
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionKey,
    state: SessionState,
    draft: Option<ProductRecord>,
    chosen_style: Option<String>,
    source: Option<InputSource>,
    photo: Option<SessionPhoto>,
}

impl Session {
    pub fn new(id: SessionKey) -> Self {
        Session {
            id,
            state: SessionState::Idle,
            draft: None,
            chosen_style: None,
            source: None,
            photo: None,
        }
    }

    pub fn id(&self) -> SessionKey {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn draft(&self) -> Option<&ProductRecord> {
        self.draft.as_ref()
    }

    pub fn chosen_style(&self) -> Option<&str> {
        self.chosen_style.as_deref()
    }

    pub fn photo_path(&self) -> Option<&Path> {
        self.photo.as_ref().map(SessionPhoto::path)
    }

    fn reset(&mut self) {
        self.draft = None;
        self.chosen_style = None;
        self.source = None;
        self.photo = None;
    }

    fn restart(&mut self, text: &str) -> Step {
        self.reset();
        self.state = SessionState::AwaitingInputChoice;
        Step::reply(vec![input_choice_prompt(text)])
    }

    pub fn handle(&mut self, event: Event) -> Step {
        debug!(
            "Session {} in {} received {}",
            self.id,
            self.state.as_str(),
            event.kind()
        );
        match (self.state, event) {
            (_, Event::Cancel) => {
                self.reset();
                self.state = SessionState::Idle;
                Step::reply(vec![Outbound::Text(messages::CANCELLED.to_string())])
            }
            (_, Event::Start) => {
                let mut step = self.restart(messages::CHOOSE_INPUT);
                step.outbound
                    .insert(0, Outbound::Text(messages::WELCOME.to_string()));
                step
            }

            (SessionState::AwaitingInputChoice, Event::Button(id)) if id == CHOICE_FROM_TEXT => {
                self.source = Some(InputSource::Text);
                self.state = SessionState::AwaitingTextDescription;
                Step::reply(vec![Outbound::Text(messages::TEXT_PROMPT.to_string())])
            }
            (SessionState::AwaitingInputChoice, Event::Button(id)) if id == CHOICE_FROM_PHOTO => {
                self.source = Some(InputSource::Photo);
                self.state = SessionState::AwaitingPhoto;
                Step::reply(vec![Outbound::Text(messages::PHOTO_PROMPT.to_string())])
            }

            (SessionState::AwaitingTextDescription, Event::Text(text)) => {
                if text.trim().is_empty() {
                    return Step::reject(InputError::EmptyText);
                }
                Step::run(
                    messages::ANALYZING_TEXT,
                    Operation::AnalyzeText { description: text },
                )
            }

            (SessionState::AwaitingPhoto, Event::Photo { bytes, caption }) => {
                if !is_supported_image(&bytes) {
                    return Step::reject(InputError::UnsupportedMedia);
                }
                Step::run(
                    messages::ANALYZING_PHOTO,
                    Operation::AnalyzeImage {
                        photo: PhotoSource::Upload(bytes),
                        caption,
                    },
                )
            }
            (SessionState::AwaitingPhoto, Event::Text(text)) if self.photo.is_some() => {
                if text.trim().is_empty() {
                    return Step::reject(InputError::EmptyText);
                }
                let held = self.photo_path().map(Path::to_path_buf);
                match held {
                    Some(path) => Step::run(
                        messages::ANALYZING_PHOTO,
                        Operation::AnalyzeImage {
                            photo: PhotoSource::Held(path),
                            caption: Some(text),
                        },
                    ),
                    None => self.corrective(),
                }
            }
            (SessionState::AwaitingPhoto, Event::UnsupportedMedia) => {
                Step::reject(InputError::UnsupportedMedia)
            }

            (SessionState::AwaitingConfirmation, Event::Button(id)) if id == CHOICE_CONFIRM => {
                match &self.draft {
                    Some(draft) if draft.is_confirmable() => {
                        self.state = SessionState::AwaitingStyleChoice;
                        Step::reply(vec![style_prompt(messages::CHOOSE_STYLE)])
                    }
                    _ => {
                        error!("Session {} confirmed without a usable draft", self.id);
                        self.restart(messages::CHOOSE_INPUT)
                    }
                }
            }
            (SessionState::AwaitingConfirmation, Event::Button(id)) if id == CHOICE_REVISE => {
                self.draft = None;
                match self.source {
                    Some(InputSource::Photo) => {
                        self.state = SessionState::AwaitingPhoto;
                        let prompt = if self.photo.is_some() {
                            messages::REVISE_PHOTO
                        } else {
                            messages::PHOTO_PROMPT
                        };
                        Step::reply(vec![Outbound::Text(prompt.to_string())])
                    }
                    _ => {
                        self.state = SessionState::AwaitingTextDescription;
                        Step::reply(vec![Outbound::Text(messages::TEXT_PROMPT.to_string())])
                    }
                }
            }

            (SessionState::AwaitingStyleChoice, Event::Button(id))
                if id.starts_with(STYLE_CHOICE_PREFIX) =>
            {
                let style = id[STYLE_CHOICE_PREFIX.len()..].to_string();
                let Some(record) = self.draft.clone() else {
                    error!("Session {} reached style choice without a draft", self.id);
                    return self.restart(messages::CHOOSE_INPUT);
                };
                self.chosen_style = Some(style.clone());
                self.state = SessionState::Generating;
                Step::run(
                    messages::BUILDING_CARD,
                    Operation::BuildCard { record, style },
                )
            }

            (SessionState::Delivered, Event::Button(id)) if id == CHOICE_NEW_CARD => {
                self.restart(messages::CHOOSE_INPUT)
            }

            (_, _) => self.corrective(),
        }
    }

    /// Reminds the user what the current state expects. State is unchanged.
    fn corrective(&self) -> Step {
        let outbound = match self.state {
            SessionState::Idle => Outbound::Text(messages::IDLE_HINT.to_string()),
            SessionState::AwaitingInputChoice => input_choice_prompt(messages::USE_BUTTONS),
            SessionState::AwaitingTextDescription => {
                Outbound::Text(messages::TEXT_PROMPT.to_string())
            }
            SessionState::AwaitingPhoto => Outbound::Text(messages::EXPECTING_PHOTO.to_string()),
            SessionState::AwaitingConfirmation => {
                confirm_prompt(messages::USE_BUTTONS.to_string())
            }
            SessionState::AwaitingStyleChoice => style_prompt(messages::USE_BUTTONS),
            SessionState::Generating => Outbound::Text(messages::WAIT_FOR_CARD.to_string()),
            SessionState::Delivered => new_card_prompt(messages::DELIVERED_HINT),
        };
        Step::reply(vec![outbound])
    }

    /// Applies the result of the operation returned by the last [`Session::handle`].
    pub fn complete(&mut self, outcome: Outcome) -> Vec<Outbound> {
        match outcome {
            Outcome::Analyzed { result, photo } => self.complete_analysis(result, photo),
            Outcome::Built {
                result,
                generated_photo,
            } => self.complete_build(result, generated_photo),
        }
    }

    fn complete_analysis(
        &mut self,
        result: Result<ProductRecord, AnalysisError>,
        photo: Option<SessionPhoto>,
    ) -> Vec<Outbound> {
        let source = match self.state {
            SessionState::AwaitingTextDescription => InputSource::Text,
            SessionState::AwaitingPhoto => InputSource::Photo,
            other => {
                warn!(
                    "Session {} dropped analysis result in state {}",
                    self.id,
                    other.as_str()
                );
                return Vec::new();
            }
        };

        match result {
            Ok(mut record) => {
                if source == InputSource::Photo {
                    if let Some(photo) = photo {
                        self.photo = Some(photo);
                    }
                    record.source_image = self.photo_path().map(Path::to_path_buf);
                } else {
                    record.source_image = None;
                }
                let summary = messages::record_summary(&record);
                self.draft = Some(record);
                self.state = SessionState::AwaitingConfirmation;
                vec![confirm_prompt(summary)]
            }
            Err(err) => {
                warn!("Session {} analysis failed: {err}", self.id);
                vec![Outbound::Text(
                    analysis_failure_text(&err, source).to_string(),
                )]
            }
        }
    }

    fn complete_build(
        &mut self,
        result: Result<GeneratedCard, CardError>,
        generated_photo: Option<SessionPhoto>,
    ) -> Vec<Outbound> {
        if self.state != SessionState::Generating {
            warn!(
                "Session {} dropped card result in state {}",
                self.id,
                self.state.as_str()
            );
            return Vec::new();
        }

        match result {
            Ok(card) => {
                info!(
                    "Session {} delivered {} card {}x{}",
                    self.id, card.style, card.width, card.height
                );
                self.state = SessionState::Delivered;
                self.draft = None;
                self.photo = None;
                vec![
                    Outbound::Image {
                        path: card.path,
                        caption: messages::CARD_READY.to_string(),
                    },
                    new_card_prompt(messages::DELIVERED_HINT),
                ]
            }
            Err(err) => {
                if let Some(photo) = generated_photo {
                    if let Some(draft) = self.draft.as_mut() {
                        draft.source_image = Some(photo.path().to_path_buf());
                    }
                    self.photo = Some(photo);
                }
                self.state = SessionState::AwaitingStyleChoice;
                let text = match &err {
                    CardError::Generation(GenerationError::Timeout) => messages::GENERATION_TIMEOUT,
                    CardError::Generation(GenerationError::RemoteError(_)) => {
                        messages::GENERATION_REMOTE
                    }
                    CardError::Build(BuildError::RenderFailure(_)) => {
                        warn!("Session {} card render failed: {err}", self.id);
                        messages::BUILD_FAILED
                    }
                    CardError::Build(BuildError::InvalidRecord | BuildError::UnknownStyle(_)) => {
                        error!(
                            "Session {} card build defect (style={:?}): {err}",
                            self.id, self.chosen_style
                        );
                        messages::INTERNAL_FAILURE
                    }
                };
                vec![
                    Outbound::Text(text.to_string()),
                    style_prompt(messages::CHOOSE_STYLE),
                ]
            }
        }
    }
}
