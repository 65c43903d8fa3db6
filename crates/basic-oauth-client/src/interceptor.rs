//! Binds to oauth forms and turns their submission into a token exchange.
//!
//! A bound form never submits natively. Instead its `username` and
//! `password` fields are read at submit time and POSTed, together with
//! `grant_type=password`, to the form's action URL. The exchange runs on
//! its own task; `submit` returns as soon as it is spawned.

use std::sync::Arc;

use basic_oauth::PasswordGrant;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExchangeError, ExchangeResult};
use crate::handler::HandlerSlot;
use crate::page::{FormId, Page};
use crate::transport::Transport;

/// Class marking a form for interception.
pub const DEFAULT_FORM_CLASS: &str = "oauth";

/// Which responses reach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Parse and deliver every response, error statuses included.
    #[default]
    Always,
    /// Only parse and deliver 2xx responses; others resolve without a body.
    SuccessOnly,
}

#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Forms whose class list contains this class are bound.
    pub form_class: String,
    pub completion: CompletionMode,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            form_class: DEFAULT_FORM_CLASS.to_string(),
            completion: CompletionMode::default(),
        }
    }
}

impl InterceptorConfig {
    /// CSS selector equivalent of the binding rule.
    pub fn selector(&self) -> String {
        format!("form.{}", self.form_class)
    }
}

/// What happened to a submit.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Not intercepted: the native form submission proceeds.
    Native,
    /// Native submission prevented; the token exchange is in flight.
    Intercepted(Exchange),
}

impl SubmitOutcome {
    pub fn is_intercepted(&self) -> bool {
        matches!(self, SubmitOutcome::Intercepted(_))
    }

    pub fn into_exchange(self) -> Option<Exchange> {
        match self {
            SubmitOutcome::Intercepted(exchange) => Some(exchange),
            SubmitOutcome::Native => None,
        }
    }
}

/// Result of a finished exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: u16,
    /// Parsed body. `None` only for non-2xx responses in
    /// [`CompletionMode::SuccessOnly`].
    pub response: Option<Value>,
    /// Whether a handler received the response.
    pub delivered: bool,
}

/// An in-flight token exchange.
#[derive(Debug)]
pub struct Exchange {
    form: FormId,
    handle: JoinHandle<ExchangeResult<Completion>>,
}

impl Exchange {
    pub fn form(&self) -> FormId {
        self.form
    }

    /// Wait for the exchange to finish.
    ///
    /// A panic raised by the response handler resumes here.
    pub async fn wait(self) -> ExchangeResult<Completion> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ExchangeError::Aborted(e.to_string())),
        }
    }
}

/// One bound form.
#[derive(Debug, Clone, Copy)]
struct FormBinding {
    form: FormId,
}

/// Intercepts submission of oauth forms on a [`Page`].
pub struct FormInterceptor {
    config: InterceptorConfig,
    transport: Option<Arc<dyn Transport>>,
    handlers: HandlerSlot,
    bindings: Vec<FormBinding>,
}

impl FormInterceptor {
    /// Create an interceptor.
    ///
    /// Without a transport the interceptor is inert: it binds nothing and
    /// every submit proceeds natively.
    pub fn new(
        config: InterceptorConfig,
        transport: Option<Arc<dyn Transport>>,
        handlers: HandlerSlot,
    ) -> Self {
        Self {
            config,
            transport,
            handlers,
            bindings: Vec::new(),
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// The handler registration shared with every exchange.
    pub fn handlers(&self) -> &HandlerSlot {
        &self.handlers
    }

    pub fn is_inert(&self) -> bool {
        self.transport.is_none()
    }

    pub fn bound_forms(&self) -> Vec<FormId> {
        self.bindings.iter().map(|b| b.form).collect()
    }

    /// Bind every matching form of a parsed page, replacing earlier
    /// bindings. Returns the number of forms bound.
    pub fn attach(&mut self, page: &Page) -> usize {
        self.bindings.clear();

        if self.transport.is_none() {
            warn!(
                selector = %self.config.selector(),
                "cannot bind forms: no HTTP transport available"
            );
            return 0;
        }

        self.bindings = page
            .forms_with_class(&self.config.form_class)
            .map(|f| FormBinding { form: f.id })
            .collect();

        debug!(
            page = %page.url(),
            bound = self.bindings.len(),
            "bound {} forms",
            self.config.selector()
        );
        self.bindings.len()
    }

    /// Handle the submission of `form`.
    ///
    /// Field values are read from `page` now, not when the form was bound.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, page: &Page, form: FormId) -> SubmitOutcome {
        let Some(transport) = &self.transport else {
            return SubmitOutcome::Native;
        };
        let Some(binding) = self.bindings.iter().find(|b| b.form == form) else {
            return SubmitOutcome::Native;
        };
        let Some(form) = page.form(binding.form) else {
            return SubmitOutcome::Native;
        };

        let grant = PasswordGrant::new(
            form.value("username").unwrap_or_default(),
            form.value("password").unwrap_or_default(),
        );
        let url = page.action_url(form);

        debug!(form = %form.id, "intercepted submit");

        let handle = tokio::spawn(run_exchange(
            Arc::clone(transport),
            url,
            grant,
            self.config.completion,
            self.handlers.clone(),
        ));

        SubmitOutcome::Intercepted(Exchange {
            form: form.id,
            handle,
        })
    }
}

async fn run_exchange(
    transport: Arc<dyn Transport>,
    url: ExchangeResult<Url>,
    grant: PasswordGrant,
    mode: CompletionMode,
    handlers: HandlerSlot,
) -> ExchangeResult<Completion> {
    let outcome = post_grant(transport.as_ref(), url, &grant, mode).await;
    let handler = handlers.current().await;

    match outcome {
        Ok((status, Some(response))) => {
            let delivered = match handler {
                Some(h) => {
                    h.on_response(&response);
                    true
                }
                None => false,
            };
            Ok(Completion {
                status,
                response: Some(response),
                delivered,
            })
        }
        Ok((status, None)) => Ok(Completion {
            status,
            response: None,
            delivered: false,
        }),
        Err(e) => {
            debug!(error = %e, "token exchange failed");
            if let Some(h) = handler {
                h.on_error(&e);
            }
            Err(e)
        }
    }
}

async fn post_grant(
    transport: &dyn Transport,
    url: ExchangeResult<Url>,
    grant: &PasswordGrant,
    mode: CompletionMode,
) -> ExchangeResult<(u16, Option<Value>)> {
    let url = url?;
    let resp = transport.post_form(url.as_str(), &grant.form_fields()).await?;

    if mode == CompletionMode::SuccessOnly && !resp.is_success() {
        return Ok((resp.status, None));
    }

    let value = serde_json::from_str(&resp.body).map_err(|e| ExchangeError::MalformedResponse {
        status: resp.status,
        source: e,
    })?;
    Ok((resp.status, Some(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a canned response and records every request.
    struct CannedTransport {
        status: u16,
        body: String,
        requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn post_form(
            &self,
            url: &str,
            fields: &[(String, String)],
        ) -> ExchangeResult<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), fields.to_vec()));
            Ok(HttpResponse {
                url: url.to_string(),
                final_url: url.to_string(),
                status: self.status,
                headers: Vec::new(),
                body: self.body.clone(),
            })
        }
    }

    const TWO_FORMS: &str = r#"
        <form class="oauth" action="/token">
            <input name="username" /><input type="password" name="password" />
        </form>
        <form action="/search"><input name="q" /></form>
        <form class="oauth" action="/other-token">
            <input name="username" /><input type="password" name="password" />
        </form>
    "#;

    fn page() -> Page {
        Page::parse(TWO_FORMS, "https://example.com/login").unwrap()
    }

    fn recorder() -> (HandlerSlot, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let slot = HandlerSlot::with_handler(move |v: &Value| sink.lock().unwrap().push(v.clone()));
        (slot, seen)
    }

    fn interceptor(transport: Arc<CannedTransport>, handlers: HandlerSlot) -> FormInterceptor {
        let transport: Arc<dyn Transport> = transport;
        FormInterceptor::new(InterceptorConfig::default(), Some(transport), handlers)
    }

    #[test]
    fn test_selector() {
        assert_eq!(InterceptorConfig::default().selector(), "form.oauth");
    }

    #[tokio::test]
    async fn test_attach_binds_each_marked_form() {
        let transport = CannedTransport::new(200, "{}");
        let mut icpt = interceptor(transport, HandlerSlot::new());
        assert_eq!(icpt.attach(&page()), 2);
        assert_eq!(icpt.bound_forms(), vec![FormId(0), FormId(2)]);
    }

    #[tokio::test]
    async fn test_inert_without_transport() {
        let mut icpt = FormInterceptor::new(InterceptorConfig::default(), None, HandlerSlot::new());
        assert!(icpt.is_inert());
        assert_eq!(icpt.attach(&page()), 0);
        assert!(matches!(icpt.submit(&page(), FormId(0)), SubmitOutcome::Native));
    }

    #[tokio::test]
    async fn test_unbound_form_submits_natively() {
        let transport = CannedTransport::new(200, "{}");
        let mut icpt = interceptor(Arc::clone(&transport), HandlerSlot::new());
        let page = page();
        icpt.attach(&page);

        assert!(!icpt.submit(&page, FormId(1)).is_intercepted());
        assert!(!icpt.submit(&page, FormId(9)).is_intercepted());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_submit_reads_fields_at_submit_time() {
        let transport = CannedTransport::new(200, r#"{"access_token":"abc"}"#);
        let (slot, seen) = recorder();
        let mut icpt = interceptor(Arc::clone(&transport), slot);
        let mut page = page();
        icpt.attach(&page);

        // Filled in after binding.
        let form = page.form_mut(FormId(0)).unwrap();
        form.set_value("username", "alice");
        form.set_value("password", "secret123");

        let completion = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(completion.delivered);
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({ "access_token": "abc" })]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://example.com/token");
        assert_eq!(
            requests[0].1,
            PasswordGrant::new("alice", "secret123").form_fields()
        );
    }

    #[tokio::test]
    async fn test_forms_read_their_own_fields() {
        let transport = CannedTransport::new(200, "{}");
        let mut icpt = interceptor(Arc::clone(&transport), HandlerSlot::new());
        let mut page = page();
        icpt.attach(&page);

        page.form_mut(FormId(0)).unwrap().set_value("username", "first");
        page.form_mut(FormId(2)).unwrap().set_value("username", "second");

        icpt.submit(&page, FormId(2))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].0, "https://example.com/other-token");
        assert_eq!(requests[0].1[1], ("username".to_string(), "second".to_string()));
    }

    #[tokio::test]
    async fn test_missing_fields_sent_empty() {
        let transport = CannedTransport::new(200, "{}");
        let mut icpt = interceptor(Arc::clone(&transport), HandlerSlot::new());
        let page = page();
        icpt.attach(&page);

        icpt.submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(transport.requests()[0].1, PasswordGrant::new("", "").form_fields());
    }

    #[tokio::test]
    async fn test_no_handler_discards_response() {
        let transport = CannedTransport::new(200, r#"{"access_token":"abc"}"#);
        let mut icpt = interceptor(transport, HandlerSlot::new());
        let page = page();
        icpt.attach(&page);

        let completion = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(!completion.delivered);
        assert_eq!(completion.response, Some(json!({ "access_token": "abc" })));
    }

    #[tokio::test]
    async fn test_handler_registered_after_binding() {
        let transport = CannedTransport::new(200, r#"{"ok":1}"#);
        let slot = HandlerSlot::new();
        let mut icpt = interceptor(transport, slot.clone());
        let page = page();
        icpt.attach(&page);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        slot.register(move |v: &Value| sink.lock().unwrap().push(v.clone()))
            .await;

        icpt.submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_still_delivered() {
        let transport = CannedTransport::new(401, r#"{"error":"invalid_grant"}"#);
        let (slot, seen) = recorder();
        let mut icpt = interceptor(transport, slot);
        let page = page();
        icpt.attach(&page);

        let completion = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(completion.status, 401);
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({ "error": "invalid_grant" })]);
    }

    #[tokio::test]
    async fn test_success_only_skips_error_status() {
        let transport = CannedTransport::new(401, r#"{"error":"invalid_grant"}"#);
        let (slot, seen) = recorder();
        let config = InterceptorConfig {
            completion: CompletionMode::SuccessOnly,
            ..InterceptorConfig::default()
        };
        let transport: Arc<dyn Transport> = transport;
        let mut icpt = FormInterceptor::new(config, Some(transport), slot);
        let page = page();
        icpt.attach(&page);

        let completion = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(completion.response, None);
        assert!(!completion.delivered);
        assert!(seen.lock().unwrap().is_empty());
    }

    struct ErrorCounter {
        responses: Mutex<usize>,
        errors: Mutex<usize>,
    }

    impl crate::ResponseHandler for ErrorCounter {
        fn on_response(&self, _response: &Value) {
            *self.responses.lock().unwrap() += 1;
        }

        fn on_error(&self, _error: &ExchangeError) {
            *self.errors.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn test_malformed_body_raises_and_skips_response_hook() {
        let transport = CannedTransport::new(500, "Internal Server Error");
        let counter = Arc::new(ErrorCounter {
            responses: Mutex::new(0),
            errors: Mutex::new(0),
        });
        let slot = HandlerSlot::new();
        let hook = Arc::clone(&counter);
        slot.register(ForwardTo(hook)).await;

        let mut icpt = interceptor(transport, slot);
        let page = page();
        icpt.attach(&page);

        let err = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse { status: 500, .. }));
        assert_eq!(*counter.responses.lock().unwrap(), 0);
        assert_eq!(*counter.errors.lock().unwrap(), 1);
    }

    struct ForwardTo(Arc<ErrorCounter>);

    impl crate::ResponseHandler for ForwardTo {
        fn on_response(&self, response: &Value) {
            self.0.on_response(response)
        }

        fn on_error(&self, error: &ExchangeError) {
            self.0.on_error(error)
        }
    }

    #[tokio::test]
    #[should_panic(expected = "handler failed")]
    async fn test_handler_panic_propagates() {
        let transport = CannedTransport::new(200, "{}");
        let slot = HandlerSlot::with_handler(|_: &Value| panic!("handler failed"));
        let mut icpt = interceptor(transport, slot);
        let page = page();
        icpt.attach(&page);

        let _ = icpt
            .submit(&page, FormId(0))
            .into_exchange()
            .unwrap()
            .wait()
            .await;
    }

    #[tokio::test]
    async fn test_concurrent_submits_are_independent() {
        let transport = CannedTransport::new(200, "{}");
        let (slot, seen) = recorder();
        let mut icpt = interceptor(Arc::clone(&transport), slot);
        let page = page();
        icpt.attach(&page);

        let first = icpt.submit(&page, FormId(0)).into_exchange().unwrap();
        let second = icpt.submit(&page, FormId(0)).into_exchange().unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
