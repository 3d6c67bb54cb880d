use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::card::{CardBuilder, StyleId};
use crate::llm::extract::merge_caption_hints;
use crate::llm::image_prompt;
use crate::llm::ports::{AnalysisError, ImageGeneration, TextAnalysis, VisionAnalysis};
use crate::llm::retry::call_with_timeout_retry;
use crate::product::ProductRecord;
use crate::session::machine::{
    CardError, Event, Operation, Outbound, Outcome, PhotoSource, Session, SessionKey,
};
use crate::session::messages;
use crate::session::photo::SessionPhoto;
use crate::session::Delivery;
use crate::utils::timing::EventTimer;

/// Runs session events end to end: transition, replies, awaited operation, result.
pub struct SessionDriver {
    text: Arc<dyn TextAnalysis>,
    vision: Arc<dyn VisionAnalysis>,
    image_gen: Option<Arc<dyn ImageGeneration>>,
    builder: CardBuilder,
    work_dir: PathBuf,
    analysis_timeout: Duration,
    image_timeout: Duration,
}

impl SessionDriver {
    pub fn new(
        text: Arc<dyn TextAnalysis>,
        vision: Arc<dyn VisionAnalysis>,
        image_gen: Option<Arc<dyn ImageGeneration>>,
        builder: CardBuilder,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        SessionDriver {
            text,
            vision,
            image_gen,
            builder,
            work_dir: work_dir.into(),
            analysis_timeout: Duration::from_secs(60),
            image_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeouts(mut self, analysis: Duration, image: Duration) -> Self {
        self.analysis_timeout = analysis;
        self.image_timeout = image;
        self
    }

    /// Directory holding one session's photos.
    pub fn session_dir(&self, session_id: SessionKey) -> PathBuf {
        self.work_dir.join("sessions").join(session_id.to_string())
    }

    pub async fn process(
        &self,
        session: &mut Session,
        event: Event,
        cancel_epoch: &AtomicU64,
        delivery: &dyn Delivery,
    ) {
        let epoch = cancel_epoch.load(Ordering::SeqCst);
        let mut timer = EventTimer::start(event.kind(), session.id(), session.state().as_str());

        let step = session.handle(event);
        if let Some(rejected) = step.rejected {
            timer.mark_status("rejected", Some(rejected.to_string()));
        }
        deliver_all(delivery, step.outbound).await;

        if let Some(operation) = step.operation {
            let kind = operation.kind();
            let outcome = self.execute(session.id(), operation, delivery).await;
            if cancel_epoch.load(Ordering::SeqCst) != epoch {
                info!(
                    "Session {} cancelled during {kind}; discarding result",
                    session.id()
                );
                discard_outcome(outcome).await;
                timer.mark_status("discarded", Some(kind.to_string()));
            } else {
                if let Some(detail) = outcome_failure(&outcome) {
                    timer.mark_status("error", Some(detail));
                }
                let replies = session.complete(outcome);
                deliver_all(delivery, replies).await;
            }
        }

        timer.complete(session.state().as_str());
    }

    async fn execute(
        &self,
        session_id: SessionKey,
        operation: Operation,
        delivery: &dyn Delivery,
    ) -> Outcome {
        match operation {
            Operation::AnalyzeText { description } => {
                let result =
                    call_with_timeout_retry("analyze_text", self.analysis_timeout, || {
                        self.text.analyze_text(&description)
                    })
                    .await;
                Outcome::Analyzed {
                    result,
                    photo: None,
                }
            }
            Operation::AnalyzeImage { photo, caption } => {
                self.analyze_photo(session_id, photo, caption).await
            }
            Operation::BuildCard { record, style } => {
                self.build_card(session_id, record, style, delivery).await
            }
        }
    }

    async fn build_card(
        &self,
        session_id: SessionKey,
        mut record: ProductRecord,
        style: String,
        delivery: &dyn Delivery,
    ) -> Outcome {
        if let Err(err) = style.parse::<StyleId>() {
            return Outcome::Built {
                result: Err(CardError::Build(err)),
                generated_photo: None,
            };
        }

        let mut generated_photo = None;
        let generator = self
            .image_gen
            .as_ref()
            .filter(|_| record.source_image.is_none());
        if let Some(generator) = generator {
            if let Err(err) = delivery
                .deliver(Outbound::Text(messages::GENERATING_IMAGE.to_string()))
                .await
            {
                warn!("Failed to deliver progress to session {session_id}: {err}");
            }
            let prompt = image_prompt(&record);
            let generated = call_with_timeout_retry("generate_image", self.image_timeout, || {
                generator.generate_image(&prompt)
            })
            .await;
            let bytes = match generated {
                Ok(bytes) => bytes,
                Err(err) => {
                    return Outcome::Built {
                        result: Err(CardError::Generation(err)),
                        generated_photo: None,
                    }
                }
            };
            match SessionPhoto::store(&self.session_dir(session_id), &bytes).await {
                Ok(photo) => {
                    record.source_image = Some(photo.path().to_path_buf());
                    generated_photo = Some(photo);
                }
                Err(err) => {
                    warn!("Could not store generated image for session {session_id}: {err}")
                }
            }
        }

        let result = self
            .builder
            .build(&record, &style)
            .await
            .map_err(CardError::from);
        Outcome::Built {
            result,
            generated_photo,
        }
    }

    async fn analyze_photo(
        &self,
        session_id: SessionKey,
        photo: PhotoSource,
        caption: Option<String>,
    ) -> Outcome {
        let (bytes, stored) = match photo {
            PhotoSource::Upload(bytes) => {
                match SessionPhoto::store(&self.session_dir(session_id), &bytes).await {
                    Ok(stored) => (bytes, Some(stored)),
                    Err(err) => {
                        warn!("Could not store photo for session {session_id}: {err}");
                        (bytes, None)
                    }
                }
            }
            PhotoSource::Held(path) => match read_held(&path).await {
                Ok(bytes) => (bytes, None),
                Err(err) => {
                    return Outcome::Analyzed {
                        result: Err(err),
                        photo: None,
                    }
                }
            },
        };

        let result = call_with_timeout_retry("analyze_image", self.analysis_timeout, || {
            self.vision.analyze_image(&bytes, caption.as_deref())
        })
        .await
        .map(|record| merge_caption_hints(record, caption.as_deref()))
        .and_then(|record| {
            if record.is_confirmable() {
                Ok(record)
            } else {
                Err(AnalysisError::ParseFailure(
                    "no product name recognised".to_string(),
                ))
            }
        });

        Outcome::Analyzed {
            result,
            photo: stored,
        }
    }
}

async fn read_held(path: &Path) -> Result<Vec<u8>, AnalysisError> {
    tokio::fs::read(path).await.map_err(|err| {
        warn!("Held photo {} unreadable: {err}", path.display());
        AnalysisError::ParseFailure(format!("held photo unavailable: {err}"))
    })
}

fn outcome_failure(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Analyzed {
            result: Err(err), ..
        } => Some(err.to_string()),
        Outcome::Built {
            result: Err(err), ..
        } => Some(err.to_string()),
        _ => None,
    }
}

/// Removes the card file of a build nobody will see.
async fn discard_outcome(outcome: Outcome) {
    if let Outcome::Built {
        result: Ok(card), ..
    } = outcome
    {
        if let Err(err) = tokio::fs::remove_file(&card.path).await {
            warn!("Failed to remove discarded card {}: {err}", card.path.display());
        }
    }
}

async fn deliver_all(delivery: &dyn Delivery, outbound: Vec<Outbound>) {
    for item in outbound {
        if let Err(err) = delivery.deliver(item).await {
            warn!("Failed to deliver reply: {err}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;

    use super::*;
    use crate::llm::extract::extract_product_locally;
    use crate::llm::ports::GenerationError;
    use crate::product::Price;
    use crate::session::machine::{SessionState, CHOICE_CONFIRM, CHOICE_FROM_PHOTO, CHOICE_FROM_TEXT};

    #[derive(Default)]
    pub(crate) struct RecordingDelivery {
        pub sent: Mutex<Vec<Outbound>>,
    }

    impl RecordingDelivery {
        pub(crate) fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .map(|item| match item {
                    Outbound::Text(text) => text.clone(),
                    Outbound::ChoicePrompt { text, .. } => text.clone(),
                    Outbound::Image { caption, .. } => caption.clone(),
                })
                .collect()
        }

        pub(crate) fn images(&self) -> Vec<PathBuf> {
            self.sent
                .lock()
                .iter()
                .filter_map(|item| match item {
                    Outbound::Image { path, .. } => Some(path.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Delivery for RecordingDelivery {
        async fn deliver(&self, outbound: Outbound) -> anyhow::Result<()> {
            self.sent.lock().push(outbound);
            Ok(())
        }
    }

    pub(crate) struct HeuristicText;

    #[async_trait]
    impl TextAnalysis for HeuristicText {
        async fn analyze_text(&self, description: &str) -> Result<ProductRecord, AnalysisError> {
            let record = extract_product_locally(description);
            if record.is_confirmable() {
                Ok(record)
            } else {
                Err(AnalysisError::ParseFailure("empty".into()))
            }
        }
    }

    pub(crate) struct FixedVision {
        record: ProductRecord,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionAnalysis for FixedVision {
        async fn analyze_image(
            &self,
            _image: &[u8],
            _caption: Option<&str>,
        ) -> Result<ProductRecord, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.record.clone())
        }
    }

    struct SlowText {
        epoch: Arc<AtomicU64>,
    }

    #[async_trait]
    impl TextAnalysis for SlowText {
        async fn analyze_text(&self, description: &str) -> Result<ProductRecord, AnalysisError> {
            // Simulates /cancel arriving while the call is in flight.
            self.epoch.fetch_add(1, Ordering::SeqCst);
            Ok(ProductRecord::named(description))
        }
    }

    struct CancellingGenerator {
        epoch: Arc<AtomicU64>,
    }

    #[async_trait]
    impl ImageGeneration for CancellingGenerator {
        async fn generate_image(&self, _prompt: &str) -> Result<Vec<u8>, GenerationError> {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            Ok(png_bytes())
        }
    }

    enum GeneratorScript {
        Png,
        Fail(GenerationError),
    }

    struct ScriptedGenerator {
        script: GeneratorScript,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGeneration for ScriptedGenerator {
        async fn generate_image(&self, _prompt: &str) -> Result<Vec<u8>, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                GeneratorScript::Png => Ok(png_bytes()),
                GeneratorScript::Fail(err) => Err(err.clone()),
            }
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(32, 32, Rgb([30, 60, 90]))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("png");
        buffer.into_inner()
    }

    pub(crate) fn vision(record: ProductRecord) -> Arc<FixedVision> {
        Arc::new(FixedVision {
            record,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn driver(
        dir: &Path,
        text: Arc<dyn TextAnalysis>,
        vision: Arc<dyn VisionAnalysis>,
        image_gen: Option<Arc<dyn ImageGeneration>>,
    ) -> SessionDriver {
        SessionDriver::new(
            text,
            vision,
            image_gen,
            CardBuilder::new(dir.join("cards"), None),
            dir.join("cache"),
        )
    }

    fn button(id: &str) -> Event {
        Event::Button(id.to_string())
    }

    async fn run(
        driver: &SessionDriver,
        session: &mut Session,
        epoch: &AtomicU64,
        delivery: &RecordingDelivery,
        events: Vec<Event>,
    ) {
        for event in events {
            driver.process(session, event, epoch, delivery).await;
        }
    }

    #[tokio::test]
    async fn text_path_delivers_card() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            None,
        );
        let mut session = Session::new(SessionKey::new(11, 11));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Беспроводные наушники Sony, цена 15990, категория электроника".into()),
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::AwaitingConfirmation);
        let draft = session.draft().expect("draft").clone();
        assert_eq!(draft.name, "Беспроводные наушники Sony");
        assert_eq!(draft.price, Some(Price::rub(15990)));
        assert_eq!(draft.category.as_deref(), Some("электроника"));

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![button(CHOICE_CONFIRM), button("style:minimal")],
        )
        .await;
        assert_eq!(session.state(), SessionState::Delivered);
        let images = delivery.images();
        assert_eq!(images.len(), 1);
        let card = image::open(&images[0]).expect("card png");
        assert_eq!((card.width(), card.height()), (800, 800));
    }

    #[tokio::test]
    async fn empty_analysis_keeps_waiting_for_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            None,
        );
        let mut session = Session::new(SessionKey::new(12, 12));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text(",,,".into()),
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::AwaitingTextDescription);
        assert!(session.draft().is_none());
        assert_eq!(
            delivery.texts().last().map(String::as_str),
            Some(messages::ANALYSIS_PARSE)
        );
    }

    #[tokio::test]
    async fn caption_price_overrides_vision_estimate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vision = vision(ProductRecord {
            name: "Керамическая кружка".into(),
            price: Some(Price::rub(800)),
            category: Some("посуда".into()),
            ..ProductRecord::default()
        });
        let driver = driver(dir.path(), Arc::new(HeuristicText), vision.clone(), None);
        let mut session = Session::new(SessionKey::new(13, 13));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_PHOTO),
                Event::Photo {
                    bytes: png_bytes(),
                    caption: Some("1200".into()),
                },
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::AwaitingConfirmation);
        let draft = session.draft().expect("draft");
        assert_eq!(draft.price, Some(Price::rub(1200)));
        assert_eq!(draft.name, "Керамическая кружка");
        let held = draft.source_image.clone().expect("held photo");
        assert!(held.starts_with(driver.session_dir(SessionKey::new(13, 13))));
        assert!(held.exists());

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![button(CHOICE_CONFIRM), button("style:marketplace")],
        )
        .await;
        assert_eq!(session.state(), SessionState::Delivered);
        assert!(!held.exists());
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_style_keeps_draft_and_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = Arc::new(ScriptedGenerator {
            script: GeneratorScript::Png,
            calls: AtomicUsize::new(0),
        });
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            Some(generator.clone() as Arc<dyn ImageGeneration>),
        );
        let mut session = Session::new(SessionKey::new(14, 14));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Рюкзак городской, цена 3500".into()),
                button(CHOICE_CONFIRM),
                button("style:unknown_style"),
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::AwaitingStyleChoice);
        assert_eq!(session.draft().map(|d| d.name.as_str()), Some("Рюкзак городской"));
        assert!(delivery.images().is_empty());
        assert!(!dir.path().join("cards").exists());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(delivery
            .texts()
            .iter()
            .any(|text| text == messages::INTERNAL_FAILURE));
    }

    #[tokio::test]
    async fn generated_image_feeds_text_cards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = Arc::new(ScriptedGenerator {
            script: GeneratorScript::Png,
            calls: AtomicUsize::new(0),
        });
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            Some(generator.clone() as Arc<dyn ImageGeneration>),
        );
        let mut session = Session::new(SessionKey::new(15, 15));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Настольная лампа, цена 2490".into()),
                button(CHOICE_CONFIRM),
                button("style:dark"),
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::Delivered);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(delivery
            .texts()
            .iter()
            .any(|text| text == messages::GENERATING_IMAGE));
        assert_eq!(delivery.images().len(), 1);
    }

    #[tokio::test]
    async fn generation_timeout_returns_to_style_choice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = Arc::new(ScriptedGenerator {
            script: GeneratorScript::Fail(GenerationError::Timeout),
            calls: AtomicUsize::new(0),
        });
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            Some(generator.clone() as Arc<dyn ImageGeneration>),
        );
        let mut session = Session::new(SessionKey::new(16, 16));
        let epoch = AtomicU64::new(0);
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Настольная лампа, цена 2490".into()),
                button(CHOICE_CONFIRM),
                button("style:dark"),
            ],
        )
        .await;
        assert_eq!(session.state(), SessionState::AwaitingStyleChoice);
        assert!(session.draft().is_some());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert!(delivery.images().is_empty());
    }

    #[tokio::test]
    async fn result_after_cancel_is_discarded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let epoch = Arc::new(AtomicU64::new(0));
        let driver = driver(
            dir.path(),
            Arc::new(SlowText {
                epoch: epoch.clone(),
            }),
            vision(ProductRecord::default()),
            None,
        );
        let mut session = Session::new(SessionKey::new(17, 17));
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Свеча ароматическая".into()),
            ],
        )
        .await;
        assert!(session.draft().is_none());
        assert_eq!(
            delivery.texts().last().map(String::as_str),
            Some(messages::ANALYZING_TEXT)
        );

        driver
            .process(&mut session, Event::Cancel, &epoch, &delivery)
            .await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn card_built_after_cancel_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let epoch = Arc::new(AtomicU64::new(0));
        let driver = driver(
            dir.path(),
            Arc::new(HeuristicText),
            vision(ProductRecord::default()),
            Some(Arc::new(CancellingGenerator {
                epoch: epoch.clone(),
            }) as Arc<dyn ImageGeneration>),
        );
        let mut session = Session::new(SessionKey::new(18, 18));
        let delivery = RecordingDelivery::default();

        run(
            &driver,
            &mut session,
            &epoch,
            &delivery,
            vec![
                Event::Start,
                button(CHOICE_FROM_TEXT),
                Event::Text("Настольная лампа, цена 2490".into()),
                button(CHOICE_CONFIRM),
                button("style:minimal"),
            ],
        )
        .await;
        assert!(delivery.images().is_empty());
        let cards_left = std::fs::read_dir(dir.path().join("cards"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(cards_left, 0);
    }
}
