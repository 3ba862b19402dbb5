//! Integration tests for installing and using the mail capability.
//!
//! These drive the installer the way a host framework would, with recording
//! transports standing in for real mail servers.

use async_trait::async_trait;
use parking_lot::Mutex;
use posthorn::prelude::*;
use posthorn::{SendPipeline, Url, VIEW_ENGINE_SETTING, VIEWS_SETTING, merge, template_url};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Host and collaborator doubles
// =============================================================================

/// Transport that records every submission and close.
#[derive(Default)]
struct Recording {
    sent: Mutex<Vec<MailOptions>>,
    closes: Mutex<usize>,
    fail_close: bool,
    fail_send: bool,
}

impl Recording {
    fn sent(&self) -> Vec<MailOptions> {
        self.sent.lock().clone()
    }

    fn closes(&self) -> usize {
        *self.closes.lock()
    }
}

#[async_trait]
impl Transport for Recording {
    async fn send_mail(&self, options: &MailOptions) -> Result<SentMail> {
        self.sent.lock().push(options.clone());
        if self.fail_send {
            return Err(MailError::Smtp("554 5.7.1 relay denied".to_string()));
        }
        Ok(SentMail {
            response: Some("250 queued".to_string()),
            ..SentMail::default()
        })
    }

    async fn close(&self) -> Result<()> {
        *self.closes.lock() += 1;
        if self.fail_close {
            return Err(MailError::Transport("close refused".to_string()));
        }
        Ok(())
    }
}

/// Factory that logs every construction call.
#[derive(Default)]
struct Factory {
    calls: Mutex<Vec<(String, TransportConfig)>>,
    created: Mutex<Vec<Arc<Recording>>>,
    fail_close: bool,
    fail_send: bool,
}

impl Factory {
    fn calls(&self) -> Vec<(String, TransportConfig)> {
        self.calls.lock().clone()
    }

    fn created(&self, index: usize) -> Arc<Recording> {
        self.created.lock()[index].clone()
    }
}

impl TransportFactory for Factory {
    fn create(&self, kind: &TransportKind, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        self.calls.lock().push((kind.to_string(), config.clone()));
        let transport = Arc::new(Recording {
            fail_close: self.fail_close,
            fail_send: self.fail_send,
            ..Recording::default()
        });
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Records the URL it was handed and wraps the HTML in a marker.
#[derive(Default)]
struct MarkingInliner {
    urls: Mutex<Vec<Url>>,
}

#[async_trait]
impl Inline for MarkingInliner {
    async fn inline(&self, html: &str, base_url: &Url) -> Result<String> {
        self.urls.lock().push(base_url.clone());
        Ok(format!("<!--inlined-->{}", html))
    }
}

type Renders = Arc<Mutex<Vec<(String, Value)>>>;

fn recording_renderer(output: &'static str, log: Renders) -> Arc<dyn Render> {
    Arc::new(render_fn(move |name, locals| {
        log.lock().push((name.to_string(), locals.clone()));
        Ok(output.to_string())
    }))
}

struct App {
    settings: HashMap<&'static str, String>,
    renders: Renders,
    mail: MailSlot,
}

impl App {
    fn new(engine: &str, views: &str) -> Self {
        Self {
            settings: HashMap::from([
                (VIEW_ENGINE_SETTING, engine.to_string()),
                (VIEWS_SETTING, views.to_string()),
            ]),
            renders: Renders::default(),
            mail: MailSlot::new(),
        }
    }

    fn mail(&self) -> Mail {
        self.mail.get().expect("mail installed on app")
    }
}

impl Application for App {
    fn get(&self, setting: &str) -> Option<String> {
        self.settings.get(setting).cloned()
    }

    fn renderer(&self) -> Arc<dyn Render> {
        recording_renderer("<p>from app</p>", self.renders.clone())
    }

    fn attach_mail(&self, mail: Mail) {
        self.mail.set(mail);
    }
}

struct Request<'a> {
    app: &'a App,
}

impl RequestContext for Request<'_> {
    type App = App;

    fn app(&self) -> &App {
        self.app
    }
}

#[derive(Default)]
struct Response {
    renders: Renders,
    mail: Option<Mail>,
}

impl Response {
    fn mail(&self) -> &Mail {
        self.mail.as_ref().expect("mail installed on response")
    }
}

impl ResponseContext for Response {
    fn renderer(&self) -> Arc<dyn Render> {
        recording_renderer("<p>from response</p>", self.renders.clone())
    }

    fn attach_mail(&mut self, mail: Mail) {
        self.mail = Some(mail);
    }
}

struct Harness {
    factory: Arc<Factory>,
    inliner: Arc<MarkingInliner>,
    app: App,
    res: Response,
}

fn harness_with(config: MailConfig, factory: Factory) -> Harness {
    let factory = Arc::new(factory);
    let inliner = Arc::new(MarkingInliner::default());
    let extension = MailExtension::with_factory(config, factory.clone())
        .unwrap()
        .with_inliner(inliner.clone());

    let app = App::new("hbs", "/srv/views");
    let mut res = Response::default();
    let mut called = false;
    extension.handle(&Request { app: &app }, &mut res, || called = true);
    assert!(called);

    Harness {
        factory,
        inliner,
        app,
        res,
    }
}

fn harness() -> Harness {
    harness_with(
        MailConfig::new("SMTP").with_config("X"),
        Factory::default(),
    )
}

fn message() -> MailOptions {
    MailOptions::new()
        .from("sender@example.com")
        .to("user@example.com")
        .locals("L")
}

// =============================================================================
// Installation
// =============================================================================

#[test]
fn test_install_attaches_mail_to_app_and_response() {
    let h = harness();
    assert!(h.app.mail.is_installed());
    assert!(h.res.mail.is_some());
}

#[test]
fn test_install_creates_stub_then_real_transport() {
    let h = harness();
    let calls = h.factory.calls();

    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], ("STUB".to_string(), TransportConfig::from("X")));
    assert_eq!(calls[1], ("SMTP".to_string(), TransportConfig::from("X")));
}

#[test]
fn test_install_defaults_caller_values_win() {
    let h = harness_with(
        MailConfig::new("SMTP")
            .with_defaults(MailOptions::new().set("generateTextFromHTML", false).subject("Hi")),
        Factory::default(),
    );

    let defaults = h.app.mail().defaults();
    assert_eq!(defaults.get("generateTextFromHTML"), Some(&json!(false)));
    assert_eq!(defaults.get_str("subject"), Some("Hi"));
}

#[test]
fn test_install_without_defaults_generates_text() {
    let h = harness();
    assert_eq!(
        h.app.mail().defaults(),
        MailOptions::new().set("generateTextFromHTML", true)
    );
}

#[test]
fn test_handle_runs_every_request() {
    let factory = Arc::new(Factory::default());
    let extension = MailExtension::with_factory(MailConfig::new("SMTP"), factory.clone()).unwrap();
    let app = App::new(".html", "views");

    for _ in 0..3 {
        let mut res = Response::default();
        let out = extension.handle(&Request { app: &app }, &mut res, || "next");
        assert_eq!(out, "next");
        assert!(res.mail.is_some());
    }

    // Transports are built once at install, not per request.
    assert_eq!(factory.calls().len(), 2);
}

// =============================================================================
// Sending
// =============================================================================

#[tokio::test]
async fn test_send_renders_inlines_and_submits_to_real_transport() {
    let h = harness();

    let sent = h.res.mail().send("template", message()).await.unwrap();
    assert_eq!(sent.response.as_deref(), Some("250 queued"));

    let renders = h.res.renders.lock().clone();
    assert_eq!(renders, vec![("template".to_string(), json!("L"))]);

    let real = h.factory.created(1).sent();
    assert_eq!(real.len(), 1);
    assert_eq!(real[0].html_body(), Some("<!--inlined--><p>from response</p>"));
    assert_eq!(real[0].get_str("to"), Some("user@example.com"));
    assert!(h.factory.created(0).sent().is_empty());
}

#[tokio::test]
async fn test_stub_submits_to_stub_transport() {
    let h = harness();

    h.app.mail().stub("template", message()).await.unwrap();

    let stub = h.factory.created(0).sent();
    assert_eq!(stub.len(), 1);
    assert_eq!(stub[0].html_body(), Some("<!--inlined--><p>from app</p>"));
    assert!(h.factory.created(1).sent().is_empty());
    assert_eq!(h.app.renders.lock().len(), 1);
    assert!(h.res.renders.lock().is_empty());
}

#[tokio::test]
async fn test_extension_appended_once_without_dot() {
    let h = harness();

    h.res.mail().send("welcome", message()).await.unwrap();
    h.res.mail().send("mail/reset.txt", message()).await.unwrap();
    h.res.mail().send("a.b/c", message()).await.unwrap();

    let urls: Vec<String> = h
        .inliner
        .urls
        .lock()
        .iter()
        .map(|u| u.to_string())
        .collect();
    assert_eq!(
        urls,
        vec![
            "file:///srv/views/welcome.hbs",
            "file:///srv/views/mail/reset.txt",
            "file:///srv/views/a.b/c",
        ]
    );
}

#[tokio::test]
async fn test_dotted_view_engine_setting_not_doubled() {
    let factory = Arc::new(Factory::default());
    let inliner = Arc::new(MarkingInliner::default());
    let extension = MailExtension::with_factory(MailConfig::new("SMTP"), factory)
        .unwrap()
        .with_inliner(inliner.clone());
    let app = App::new(".hbs", "/srv/views");
    let mut res = Response::default();
    extension.handle(&Request { app: &app }, &mut res, || ());

    res.mail().send("welcome", message()).await.unwrap();
    assert_eq!(
        inliner.urls.lock()[0].as_str(),
        "file:///srv/views/welcome.hbs"
    );
}

#[tokio::test]
async fn test_defaults_win_over_send_options() {
    let h = harness_with(
        MailConfig::new("SMTP").with_defaults(MailOptions::new().from("defaults@example.com")),
        Factory::default(),
    );

    h.res.mail().send("t", message()).await.unwrap();

    let sent = h.factory.created(1).sent();
    assert_eq!(sent[0].get_str("from"), Some("defaults@example.com"));
    assert_eq!(sent[0].get_str("to"), Some("user@example.com"));
}

#[tokio::test]
async fn test_render_error_is_returned_unchanged() {
    let factory = Arc::new(Factory::default());
    let extension = MailExtension::with_factory(MailConfig::new("SMTP"), factory.clone()).unwrap();
    let mail = extension.bind(
        Arc::new(render_fn(|name, _| {
            Err(MailError::TemplateNotFound(name.to_string()))
        })),
        "/srv/views",
        "hbs",
    );

    let err = mail.send("missing", message()).await.unwrap_err();
    assert!(matches!(err, MailError::TemplateNotFound(ref name) if name == "missing"));
    assert!(factory.created(1).sent().is_empty());
}

#[tokio::test]
async fn test_transport_send_error_is_returned_unchanged() {
    let h = harness_with(
        MailConfig::new("SMTP"),
        Factory {
            fail_send: true,
            ..Factory::default()
        },
    );

    let err = h.res.mail().send("t", message()).await.unwrap_err();
    assert!(matches!(err, MailError::Smtp(ref m) if m == "554 5.7.1 relay denied"));
    assert_eq!(h.factory.created(1).sent().len(), 1);

    let err = h.app.mail().stub("t", message()).await.unwrap_err();
    assert!(matches!(err, MailError::Smtp(ref m) if m == "554 5.7.1 relay denied"));
    assert_eq!(h.factory.created(0).sent().len(), 1);
}

#[test]
fn test_merge_defaults_win() {
    let options = MailOptions::new().from("a@example.com").subject("caller");
    let defaults = MailOptions::new().subject("default").text("body");

    let merged = merge(Some(options), Some(&defaults)).unwrap();

    assert_eq!(merged.get_str("from"), Some("a@example.com"));
    assert_eq!(merged.get_str("subject"), Some("default"));
    assert_eq!(merged.get_str("text"), Some("body"));
    assert_eq!(merged.len(), 3);
}

// =============================================================================
// Reload
// =============================================================================

#[tokio::test]
async fn test_reload_closes_current_transport_each_time() {
    let h = harness();

    h.res.mail().reload(&MailConfig::default()).await.unwrap();
    assert_eq!(h.factory.created(1).closes(), 1);

    h.app.mail().reload(&MailConfig::default()).await.unwrap();
    assert_eq!(h.factory.created(1).closes(), 1);
    assert_eq!(h.factory.created(2).closes(), 1);
    assert_eq!(h.factory.calls().len(), 4);

    // The stub is never closed or rebuilt.
    assert_eq!(h.factory.created(0).closes(), 0);
}

#[tokio::test]
async fn test_reload_via_response_affects_app() {
    let h = harness();

    h.res
        .mail()
        .reload(&MailConfig::new("sendmail").with_defaults(MailOptions::new().subject("v2")))
        .await
        .unwrap();

    h.app.mail().send("t", message()).await.unwrap();

    assert!(h.factory.created(1).sent().is_empty());
    let sent = h.factory.created(2).sent();
    assert_eq!(sent[0].get_str("subject"), Some("v2"));
    assert_eq!(h.factory.calls()[2].0, "SENDMAIL");
}

#[tokio::test]
async fn test_reload_resets_defaults() {
    let h = harness_with(
        MailConfig::new("SMTP").with_defaults(MailOptions::new().subject("old")),
        Factory::default(),
    );

    h.app.mail().reload(&MailConfig::default()).await.unwrap();

    // Reset to a fresh copy, without the install-time base defaults.
    assert!(h.app.mail().defaults().is_empty());
}

#[tokio::test]
async fn test_reload_close_failure_keeps_old_transport() {
    let h = harness_with(
        MailConfig::new("SMTP").with_defaults(MailOptions::new().subject("old")),
        Factory {
            fail_close: true,
            ..Factory::default()
        },
    );

    let err = h
        .res
        .mail()
        .reload(&MailConfig::new("SMTP").with_defaults(MailOptions::new().subject("new")))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::Transport(_)));

    assert_eq!(h.factory.calls().len(), 2);
    assert_eq!(h.app.mail().defaults().get_str("subject"), Some("old"));

    h.res.mail().send("t", message()).await.unwrap();
    assert_eq!(h.factory.created(1).sent().len(), 1);
}

// =============================================================================
// CSS inlining
// =============================================================================

#[tokio::test]
async fn test_sent_html_matches_css_inline_output() {
    let factory = Arc::new(Factory::default());
    let extension = MailExtension::with_factory(MailConfig::new("SMTP"), factory.clone()).unwrap();
    let html = "<style>body{color:#fff}</style><body>test</body>";
    let mail = extension.bind(
        Arc::new(render_fn(move |_, _| Ok(html.to_string()))),
        "/srv/views",
        ".hbs",
    );

    mail.send("template", message()).await.unwrap();

    let url = template_url(std::path::Path::new("/srv/views"), "template.hbs").unwrap();
    let expected = CssInliner::new().inline_blocking(html, &url).unwrap();

    let sent = factory.created(1).sent();
    assert_eq!(sent[0].html_body(), Some(expected.as_str()));
    assert!(expected.contains("color"));
    assert!(!expected.contains("<style>"));
}

#[tokio::test]
async fn test_pipeline_with_builtin_stub_composes_message() {
    let holder = TransportHolder::new(
        &MailConfig::new("STUB"),
        Arc::new(posthorn::DefaultTransportFactory),
    )
    .unwrap();
    let pipeline = SendPipeline::stub(
        holder,
        Arc::new(render_fn(|_, _| Ok("<h1>Welcome</h1><p>Glad you're here.</p>".to_string()))),
        Arc::new(CssInliner::new()),
        "/srv/views",
        "hbs",
    );

    let sent = pipeline
        .send("welcome", message().subject("Welcome"))
        .await
        .unwrap();

    assert_eq!(sent.envelope.from.as_deref(), Some("sender@example.com"));
    assert_eq!(sent.envelope.to, vec!["user@example.com".to_string()]);
    let raw = String::from_utf8(sent.message.unwrap()).unwrap();
    assert!(raw.contains("Subject: Welcome"));
    assert!(raw.contains("multipart/alternative"));
}
