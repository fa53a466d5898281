use super::*;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::MissingSettingsBackend;

struct TestSettingsBackend {
    fail_with: Option<String>,
    stored: Arc<Mutex<Option<String>>>,
    written: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl TestSettingsBackend {
    fn empty() -> Self {
        Self {
            fail_with: None,
            stored: Arc::new(Mutex::new(None)),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_persisted(raw: impl Into<String>) -> Self {
        let backend = Self::empty();
        let raw = raw.into();
        *backend
            .stored
            .try_lock()
            .expect("fresh backend is unlocked") = Some(raw);
        backend
    }

    fn failing(err: &str) -> Self {
        let mut backend = Self::empty();
        backend.fail_with = Some(err.to_string());
        backend
    }
}

#[async_trait]
impl SettingsBackend for TestSettingsBackend {
    async fn read_value(&self, _group: &str, _key: &str) -> Result<Option<String>> {
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(self.stored.lock().await.clone())
    }

    async fn write_value(&self, group: &str, key: &str, value: &str) -> Result<()> {
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        *self.stored.lock().await = Some(value.to_string());
        self.written
            .lock()
            .await
            .push((group.to_string(), key.to_string(), value.to_string()));
        Ok(())
    }
}

const CANONICAL_PAIR: &str =
    r#"[{"name":"A","servoOutput":1,"pulseWidth":1000.0},{"name":"B","servoOutput":2,"pulseWidth":1500.0}]"#;

fn pair() -> Vec<ServoButton> {
    vec![
        ServoButton::new("A", 1, 1000.0),
        ServoButton::new("B", 2, 1500.0),
    ]
}

async fn expect_buttons_changed(
    rx: &mut broadcast::Receiver<ButtonStoreEvent>,
) -> Vec<ServoButton> {
    match rx.recv().await.expect("store event") {
        ButtonStoreEvent::ButtonsChanged { buttons } => buttons,
    }
}

#[tokio::test]
async fn starts_empty_when_nothing_is_persisted() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::empty())).await;
    assert!(store.buttons().await.is_empty());
}

#[tokio::test]
async fn loads_persisted_buttons() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(CANONICAL_PAIR)))
        .await;
    assert_eq!(store.buttons().await, pair());
}

#[tokio::test]
async fn blank_persisted_value_is_an_empty_list() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted("   "))).await;
    assert!(store.buttons().await.is_empty());
}

#[tokio::test]
async fn malformed_persisted_value_is_an_empty_list() {
    let store =
        ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted("{not json"))).await;
    assert!(store.buttons().await.is_empty());
}

#[tokio::test]
async fn non_array_persisted_value_is_an_empty_list() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(
        r#"{"name":"A"}"#,
    )))
    .await;
    assert!(store.buttons().await.is_empty());
}

#[tokio::test]
async fn load_drops_entries_with_blank_names() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(
        r#"[{"name":"  ","servoOutput":9,"pulseWidth":900.0},{"name":"B","servoOutput":2,"pulseWidth":1500.0}]"#,
    )))
    .await;
    assert_eq!(store.buttons().await, vec![ServoButton::new("B", 2, 1500.0)]);
}

#[tokio::test]
async fn read_failure_starts_empty_without_writing() {
    let backend = TestSettingsBackend::failing("backend offline");
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;

    assert!(store.buttons().await.is_empty());
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn add_button_appends_persists_and_emits() {
    let backend = TestSettingsBackend::empty();
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.add_button("Drop", 7, 1900.0).await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(buttons, vec![ServoButton::new("Drop", 7, 1900.0)]);
    assert_eq!(store.buttons().await, buttons);

    let written = written.lock().await;
    assert_eq!(written.len(), 1);
    assert_eq!(
        written[0],
        (
            SERVO_SETTINGS_GROUP.to_string(),
            SERVO_BUTTONS_KEY.to_string(),
            r#"[{"name":"Drop","servoOutput":7,"pulseWidth":1900.0}]"#.to_string(),
        )
    );
}

#[tokio::test]
async fn add_with_blank_name_suppresses_write_and_event() {
    let backend = TestSettingsBackend::with_persisted("[]");
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.add_button("   ", 5, 1200.0).await;

    assert!(rx.try_recv().is_err());
    assert!(store.buttons().await.is_empty());
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn add_with_blank_name_to_unwritten_store_normalizes_without_event() {
    let backend = TestSettingsBackend::empty();
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.add_button("   ", 5, 1200.0).await;

    // The content did not change, but the backend had no encoding yet, so
    // the empty list is written out once.
    assert!(rx.try_recv().is_err());
    let written = written.lock().await;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].2, "[]");
}

#[tokio::test]
async fn update_button_replaces_the_entry() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(CANONICAL_PAIR)))
        .await;
    let mut rx = store.subscribe_events();

    store.update_button(1, "Lift", 3, 1800.0).await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(
        buttons,
        vec![
            ServoButton::new("A", 1, 1000.0),
            ServoButton::new("Lift", 3, 1800.0),
        ]
    );
}

#[tokio::test]
async fn update_out_of_range_is_ignored() {
    let backend = TestSettingsBackend::with_persisted(CANONICAL_PAIR);
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.update_button(5, "Lift", 3, 1800.0).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(store.buttons().await, pair());
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn remove_button_shifts_later_entries_down() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(CANONICAL_PAIR)))
        .await;
    let mut rx = store.subscribe_events();

    store.remove_button(0).await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(buttons, vec![ServoButton::new("B", 2, 1500.0)]);
}

#[tokio::test]
async fn remove_out_of_range_is_ignored() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(CANONICAL_PAIR)))
        .await;
    let mut rx = store.subscribe_events();

    store.remove_button(2).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(store.buttons().await, pair());
}

#[tokio::test]
async fn resaving_identical_content_writes_nothing() {
    let backend = TestSettingsBackend::with_persisted(CANONICAL_PAIR);
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.set_buttons(pair()).await;

    assert!(rx.try_recv().is_err());
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn noncanonical_persisted_form_is_rewritten_without_event() {
    // Same content, but integers persisted where the canonical form uses
    // floats. The re-save normalizes the stored text without announcing a
    // content change.
    let backend = TestSettingsBackend::with_persisted(
        r#"[{"name":"A","servoOutput":1,"pulseWidth":1000}]"#,
    );
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.set_buttons(vec![ServoButton::new("A", 1, 1000.0)]).await;

    assert!(rx.try_recv().is_err());
    let written = written.lock().await;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].2, r#"[{"name":"A","servoOutput":1,"pulseWidth":1000.0}]"#);
}

#[tokio::test]
async fn write_failure_keeps_the_in_memory_list() {
    let backend = TestSettingsBackend::failing("backend offline");
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    store.add_button("Drop", 7, 1900.0).await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(buttons, vec![ServoButton::new("Drop", 7, 1900.0)]);
    assert_eq!(store.buttons().await, buttons);
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn reload_picks_up_an_external_change() {
    let backend = TestSettingsBackend::empty();
    let stored = backend.stored.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;
    let mut rx = store.subscribe_events();

    *stored.lock().await = Some(CANONICAL_PAIR.to_string());
    store.reload().await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(buttons, pair());
    assert_eq!(store.buttons().await, pair());
}

#[tokio::test]
async fn reload_with_unchanged_content_stays_silent() {
    let store = ButtonStore::load(Arc::new(TestSettingsBackend::with_persisted(CANONICAL_PAIR)))
        .await;
    let mut rx = store.subscribe_events();

    store.reload().await;

    assert!(rx.try_recv().is_err());
    assert_eq!(store.buttons().await, pair());
}

#[tokio::test]
async fn reload_never_writes_back() {
    let backend = TestSettingsBackend::with_persisted("{not json");
    let written = backend.written.clone();
    let store = ButtonStore::load(Arc::new(backend)).await;

    store.reload().await;

    assert!(store.buttons().await.is_empty());
    assert!(written.lock().await.is_empty());
}

#[tokio::test]
async fn missing_settings_backend_degrades_to_memory_only() {
    let store = ButtonStore::load(Arc::new(MissingSettingsBackend)).await;
    let mut rx = store.subscribe_events();

    assert!(store.buttons().await.is_empty());

    store.add_button("Drop", 7, 1900.0).await;

    let buttons = expect_buttons_changed(&mut rx).await;
    assert_eq!(buttons, vec![ServoButton::new("Drop", 7, 1900.0)]);
    assert_eq!(store.buttons().await, buttons);
}
