//! The upload-and-caption workflow as an explicit state machine.
//!
//! Page interactions and network completions arrive as [`Event`]s. The
//! controller updates its own state and, when something must happen outside
//! of it (sending a request, touching the clipboard, asking the user to
//! confirm), returns an [`Effect`] for the caller to carry out.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::client::{CaptionJob, CaptionResult, HealthStatus};
use crate::error::{CaptionError, IntakeError};
use crate::history::{CaptionRecord, HistoryStore};
use crate::intake::{self, CandidateFile, IntakeSource, SelectedImage, MAX_IMAGE_BYTES};

pub const CAPTION_PLACEHOLDER: &str = "Your caption will appear here...";
pub const TOAST_DURATION: Duration = Duration::from_secs(3);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No image selected.
    Idle,
    /// Image selected, nothing generated for it yet.
    Ready,
    /// A caption request is in flight.
    Pending,
    /// Caption shown for the selected image.
    Captioned,
    /// The last request failed; a new attempt is allowed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Key {
    Enter,
    #[serde(other)]
    Other,
}

#[derive(Debug)]
pub enum Event {
    FileOffered {
        source: IntakeSource,
        file: CandidateFile,
    },
    /// Clipboard contents; only the first image item is considered.
    Pasted(Vec<CandidateFile>),
    GenerateClicked {
        prompt: String,
    },
    KeyPressed {
        key: Key,
        prompt: String,
    },
    CaptionReceived(Result<CaptionResult, CaptionError>),
    /// The in-flight request ended, whether or not a result was delivered.
    InFlightReleased,
    CopyRequested,
    ShareRequested {
        native_share: bool,
    },
    ClearHistoryRequested {
        confirmed: bool,
    },
    StatusReported(HealthStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Dispatch(CaptionJob),
    CopyToClipboard(String),
    NativeShare(String),
    ConfirmClear,
}

/// What is needed to record a result once the request completes.
#[derive(Debug)]
struct InFlight {
    selection: u64,
    file_name: String,
    image_data: String,
    prompt: Option<String>,
}

/// Owns all workflow state: selection, result display, history and toasts.
pub struct Controller {
    history: HistoryStore,
    selected: Option<SelectedImage>,
    selection: u64,
    phase: Phase,
    caption_text: String,
    inference_display: Option<String>,
    round_trip_display: Option<String>,
    in_flight: Option<InFlight>,
    device_status: String,
    toasts: Vec<Toast>,
}

impl Controller {
    pub fn new(history: HistoryStore) -> Self {
        Self {
            history,
            selected: None,
            selection: 0,
            phase: Phase::Idle,
            caption_text: CAPTION_PLACEHOLDER.to_string(),
            inference_display: None,
            round_trip_display: None,
            in_flight: None,
            device_status: "checking".to_string(),
            toasts: Vec::new(),
        }
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> Option<Effect> {
        self.toasts.retain(|toast| toast.expires_at > now);

        match event {
            Event::FileOffered { source, file } => {
                self.select(file, source, now);
                None
            }
            // A text-only paste carries no file items and is not ours to handle.
            Event::Pasted(items) if items.is_empty() => None,
            Event::Pasted(items) => {
                match intake::first_image_item(items) {
                    Some(file) => self.select(file, IntakeSource::Clipboard, now),
                    None => self.toast(ToastKind::Info, "No image found in clipboard", now),
                }
                None
            }
            Event::GenerateClicked { prompt } => self.start_generation(&prompt, now),
            Event::KeyPressed { key, prompt } => {
                if key == Key::Enter && self.selected.is_some() {
                    self.start_generation(&prompt, now)
                } else {
                    None
                }
            }
            Event::CaptionReceived(result) => {
                self.finish(result, now);
                None
            }
            Event::InFlightReleased => {
                if self.in_flight.is_some() {
                    warn!("caption request ended without a response");
                    self.finish(
                        Err(CaptionError::Service("the request was interrupted".to_string())),
                        now,
                    );
                }
                None
            }
            Event::CopyRequested => self.copy_caption(),
            Event::ShareRequested { native_share } => {
                if !self.has_caption() {
                    return None;
                }
                if native_share {
                    Some(Effect::NativeShare(self.caption_text.clone()))
                } else {
                    self.copy_caption()
                }
            }
            Event::ClearHistoryRequested { confirmed: false } => Some(Effect::ConfirmClear),
            Event::ClearHistoryRequested { confirmed: true } => {
                match self.history.clear() {
                    Ok(()) => self.toast(ToastKind::Success, "History cleared", now),
                    Err(e) => {
                        error!("failed to clear history: {}", e);
                        self.toast(ToastKind::Error, "Could not clear history", now);
                    }
                }
                None
            }
            Event::StatusReported(health) => {
                self.device_status = health.device_label();
                None
            }
        }
    }

    fn select(&mut self, file: CandidateFile, source: IntakeSource, now: Instant) {
        match intake::validate(file, source) {
            Ok(image) => {
                info!(
                    "selected {} ({}, {:?})",
                    image.file_name,
                    image.size_label(),
                    image.dimensions
                );
                self.selected = Some(image);
                self.selection += 1;
                self.caption_text = CAPTION_PLACEHOLDER.to_string();
                self.inference_display = None;
                self.round_trip_display = None;
                if self.phase != Phase::Pending {
                    self.phase = Phase::Ready;
                }
                self.toast(ToastKind::Success, "Image loaded", now);
            }
            Err(e) => {
                warn!("rejected file: {}", e);
                let message = match e {
                    IntakeError::InvalidFileType { .. } => "Please select an image file".to_string(),
                    IntakeError::FileTooLarge { .. } => format!(
                        "File size must be less than {}MB",
                        MAX_IMAGE_BYTES / (1024 * 1024)
                    ),
                };
                self.toast(ToastKind::Error, message, now);
            }
        }
    }

    fn start_generation(&mut self, prompt: &str, now: Instant) -> Option<Effect> {
        if self.phase == Phase::Pending {
            return None;
        }
        if self.selected.is_none() {
            self.toast(ToastKind::Error, "Please select an image first", now);
            return None;
        }
        let image = self.selected.as_ref()?;

        let prompt = Some(prompt.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let job = CaptionJob {
            file_name: image.file_name.clone(),
            content_type: image.content_type.clone(),
            bytes: image.bytes.clone(),
            prompt: prompt.clone(),
        };
        self.in_flight = Some(InFlight {
            selection: self.selection,
            file_name: image.file_name.clone(),
            image_data: image.data_url(),
            prompt,
        });
        self.phase = Phase::Pending;
        self.inference_display = None;
        self.round_trip_display = None;

        Some(Effect::Dispatch(job))
    }

    fn finish(&mut self, result: Result<CaptionResult, CaptionError>, now: Instant) {
        let Some(flight) = self.in_flight.take() else {
            warn!("ignoring caption response with no request in flight");
            return;
        };
        let current = flight.selection == self.selection;

        match result {
            Ok(result) => {
                let record = CaptionRecord {
                    image_data: flight.image_data,
                    caption: result.caption.clone(),
                    timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
                    inference_time_seconds: result.inference_time_seconds,
                    prompt: flight.prompt,
                    file_name: flight.file_name,
                };
                if let Err(e) = self.history.append(record) {
                    error!("failed to save caption history: {}", e);
                    self.toast(ToastKind::Error, "Caption history could not be saved", now);
                }

                if current {
                    self.caption_text = result.caption;
                    self.inference_display = Some(format_inference_time(result.inference_time_seconds));
                    self.round_trip_display = Some(format!("{} ms", result.round_trip.as_millis()));
                    self.phase = Phase::Captioned;
                } else {
                    self.phase = Phase::Ready;
                }
                self.toast(ToastKind::Success, "Caption generated successfully!", now);
            }
            Err(e) => {
                error!("caption request failed: {}", e);
                if current {
                    self.caption_text = format!("Error: {}", e);
                    self.phase = Phase::Failed;
                } else {
                    self.phase = Phase::Ready;
                }
                self.toast(ToastKind::Error, format!("Failed to generate caption: {}", e), now);
            }
        }
    }

    /// The page reports the clipboard outcome itself; nothing is toasted here.
    fn copy_caption(&self) -> Option<Effect> {
        if !self.has_caption() {
            return None;
        }
        Some(Effect::CopyToClipboard(self.caption_text.clone()))
    }

    fn toast(&mut self, kind: ToastKind, message: impl Into<String>, now: Instant) {
        self.toasts.push(Toast {
            kind,
            message: message.into(),
            expires_at: now + TOAST_DURATION,
        });
    }

    fn has_caption(&self) -> bool {
        self.caption_text != CAPTION_PLACEHOLDER
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    /// Generation is possible while an image is held and nothing is in flight.
    pub fn trigger_enabled(&self) -> bool {
        self.selected.is_some() && self.phase != Phase::Pending
    }

    pub fn caption_text(&self) -> &str {
        &self.caption_text
    }

    pub fn inference_display(&self) -> Option<&str> {
        self.inference_display.as_deref()
    }

    pub fn round_trip_display(&self) -> Option<&str> {
        self.round_trip_display.as_deref()
    }

    pub fn history(&self) -> &[CaptionRecord] {
        self.history.records()
    }

    pub fn device_status(&self) -> &str {
        &self.device_status
    }

    pub fn toasts(&self, now: Instant) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().filter(move |toast| toast.expires_at > now)
    }

    pub fn view(&self, now: Instant) -> View {
        View {
            phase: self.phase,
            trigger_enabled: self.trigger_enabled(),
            loading: self.phase == Phase::Pending,
            caption: self.caption_text.clone(),
            has_caption: self.has_caption(),
            inference_time: self.inference_display.clone(),
            round_trip: self.round_trip_display.clone(),
            selected: self.selected.as_ref().map(SelectedView::from),
            history: self
                .history
                .records()
                .iter()
                .enumerate()
                .map(|(index, record)| HistoryItemView::new(index, record))
                .collect(),
            device: self.device_status.clone(),
            toasts: self
                .toasts(now)
                .map(|toast| ToastView {
                    kind: toast.kind,
                    message: toast.message.clone(),
                })
                .collect(),
        }
    }
}

pub fn format_inference_time(seconds: f64) -> String {
    format!("{:.2}s", seconds)
}

/// Serializable snapshot of everything the page renders.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub phase: Phase,
    pub trigger_enabled: bool,
    pub loading: bool,
    pub caption: String,
    pub has_caption: bool,
    pub inference_time: Option<String>,
    pub round_trip: Option<String>,
    pub selected: Option<SelectedView>,
    pub history: Vec<HistoryItemView>,
    pub device: String,
    pub toasts: Vec<ToastView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedView {
    pub file_name: String,
    pub size: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub data_url: String,
}

impl From<&SelectedImage> for SelectedView {
    fn from(image: &SelectedImage) -> Self {
        Self {
            file_name: image.file_name.clone(),
            size: image.size_label(),
            width: image.dimensions.map(|(w, _)| w),
            height: image.dimensions.map(|(_, h)| h),
            data_url: image.data_url(),
        }
    }
}

/// A history entry as the page lists it. The image is fetched separately
/// from `image_url` instead of riding along in every view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItemView {
    pub caption: String,
    pub timestamp: String,
    pub inference_time_seconds: f64,
    pub prompt: Option<String>,
    pub file_name: String,
    pub image_url: String,
}

impl HistoryItemView {
    fn new(index: usize, record: &CaptionRecord) -> Self {
        // Indexes shift as entries are added; the query keeps caches honest.
        let version: String = record.timestamp.chars().filter(char::is_ascii_digit).collect();
        Self {
            caption: record.caption.clone(),
            timestamp: record.timestamp.clone(),
            inference_time_seconds: record.inference_time_seconds,
            prompt: record.prompt.clone(),
            file_name: record.file_name.clone(),
            image_url: format!("/api/history/{index}/image?v={version}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToastView {
    pub kind: ToastKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;

    fn controller() -> Controller {
        Controller::new(HistoryStore::open(MemoryStore::new()))
    }

    fn image(name: &str) -> Event {
        Event::FileOffered {
            source: IntakeSource::FilePicker,
            file: CandidateFile::new(name, "image/jpeg", vec![0xff, 0xd8, 0xff]),
        }
    }

    fn ok(caption: &str) -> Event {
        Event::CaptionReceived(Ok(CaptionResult {
            caption: caption.to_string(),
            inference_time_seconds: 0.42,
            round_trip: Duration::from_millis(500),
        }))
    }

    #[test]
    fn starts_idle_with_trigger_disabled() {
        let c = controller();
        assert_eq!(c.phase(), Phase::Idle);
        assert!(!c.trigger_enabled());
        assert_eq!(c.caption_text(), CAPTION_PLACEHOLDER);
    }

    #[test]
    fn generate_without_image_does_nothing() {
        let mut c = controller();
        let now = Instant::now();
        let effect = c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        assert!(effect.is_none());
        assert_eq!(c.phase(), Phase::Idle);
        assert_eq!(c.toasts(now).count(), 1);
    }

    #[test]
    fn second_generate_while_pending_is_ignored() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        assert!(c.handle(Event::GenerateClicked { prompt: String::new() }, now).is_some());
        assert!(!c.trigger_enabled());
        assert!(c.handle(Event::GenerateClicked { prompt: String::new() }, now).is_none());
    }

    #[test]
    fn blank_prompt_is_not_sent() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        let Some(Effect::Dispatch(job)) =
            c.handle(Event::GenerateClicked { prompt: "   ".into() }, now)
        else {
            panic!("expected dispatch");
        };
        assert_eq!(job.prompt, None);
    }

    #[test]
    fn enter_only_triggers_with_image() {
        let mut c = controller();
        let now = Instant::now();
        let enter = || Event::KeyPressed {
            key: Key::Enter,
            prompt: String::new(),
        };
        assert!(c.handle(enter(), now).is_none());
        assert!(c.toasts(now).next().is_none());

        c.handle(image("a.jpg"), now);
        assert!(matches!(c.handle(enter(), now), Some(Effect::Dispatch(_))));
    }

    #[test]
    fn toasts_expire_after_three_seconds() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        assert_eq!(c.toasts(now + Duration::from_millis(2900)).count(), 1);
        assert_eq!(c.toasts(now + TOAST_DURATION).count(), 0);
    }

    #[test]
    fn copy_is_noop_on_placeholder() {
        let mut c = controller();
        let now = Instant::now();
        assert!(c.handle(Event::CopyRequested, now).is_none());
        assert!(c
            .handle(Event::ShareRequested { native_share: true }, now)
            .is_none());

        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(ok("a dog"), now);
        assert_eq!(
            c.handle(Event::CopyRequested, now),
            Some(Effect::CopyToClipboard("a dog".into()))
        );
    }

    #[test]
    fn copy_request_does_not_claim_success() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(ok("a dog"), now);
        let before = c.toasts(now).count();

        assert!(c.handle(Event::CopyRequested, now).is_some());
        assert!(c.handle(Event::ShareRequested { native_share: false }, now).is_some());
        assert_eq!(c.toasts(now).count(), before);
        assert!(c.toasts(now).all(|t| !t.message.contains("copied")));
    }

    #[test]
    fn view_history_links_images_instead_of_inlining_them() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: "a photo of".into() }, now);
        c.handle(ok("a dog"), now);

        let view = serde_json::to_value(c.view(now)).unwrap();
        let item = &view["history"][0];
        assert_eq!(item["caption"], "a dog");
        assert_eq!(item["fileName"], "a.jpg");
        assert_eq!(item["prompt"], "a photo of");
        assert!(item.get("imageData").is_none());
        assert!(item["imageUrl"].as_str().unwrap().starts_with("/api/history/0/image?v="));
        assert!(!view["history"].to_string().contains("base64"));
    }

    #[test]
    fn share_falls_back_to_copy() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(ok("a dog"), now);
        assert_eq!(
            c.handle(Event::ShareRequested { native_share: true }, now),
            Some(Effect::NativeShare("a dog".into()))
        );
        assert_eq!(
            c.handle(Event::ShareRequested { native_share: false }, now),
            Some(Effect::CopyToClipboard("a dog".into()))
        );
    }

    #[test]
    fn released_guard_without_response_reenables_trigger() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(Event::InFlightReleased, now);
        assert_eq!(c.phase(), Phase::Failed);
        assert!(c.trigger_enabled());
        assert!(c.history().is_empty());
    }

    #[test]
    fn released_guard_after_response_changes_nothing() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(ok("a dog"), now);
        c.handle(Event::InFlightReleased, now);
        assert_eq!(c.phase(), Phase::Captioned);
        assert_eq!(c.caption_text(), "a dog");
    }

    #[test]
    fn new_selection_during_request_keeps_display_reset() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(image("a.jpg"), now);
        c.handle(Event::GenerateClicked { prompt: String::new() }, now);
        c.handle(image("b.jpg"), now);
        assert_eq!(c.phase(), Phase::Pending);

        c.handle(ok("a dog"), now);
        assert_eq!(c.phase(), Phase::Ready);
        assert_eq!(c.caption_text(), CAPTION_PLACEHOLDER);
        assert_eq!(c.history()[0].file_name, "a.jpg");
    }

    #[test]
    fn status_report_sets_device() {
        let mut c = controller();
        c.handle(Event::StatusReported(HealthStatus::offline()), Instant::now());
        assert_eq!(c.device_status(), "offline");
    }
}
