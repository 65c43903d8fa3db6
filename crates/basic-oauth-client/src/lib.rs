//! basic-oauth-client: intercepts oauth login forms and exchanges their
//! credentials for a bearer token.
//!
//! Parse a page into a [`Page`], [`FormInterceptor::attach`] to it, then
//! route submits through [`FormInterceptor::submit`]. Responses reach the
//! [`ResponseHandler`] registered in the interceptor's [`HandlerSlot`].

pub mod error;
pub mod handler;
pub mod interceptor;
pub mod page;
pub mod transport;

pub use error::{ExchangeError, ExchangeResult};
pub use handler::{HandlerSlot, ResponseHandler};
pub use interceptor::{
    Completion, CompletionMode, Exchange, FormInterceptor, InterceptorConfig, SubmitOutcome,
    DEFAULT_FORM_CLASS,
};
pub use page::{Form, FormField, FormId, Page};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
