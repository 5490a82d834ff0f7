// src/dispatch/mod.rs — Request dispatch: routing, interceptors, outcomes

pub mod dispatcher;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod visitor;

pub use dispatcher::{Dispatcher, Outcome};
pub use interceptor::{Flow, Interceptor, InterceptorChain};
pub use request::{Request, Route};
pub use response::{BufferedResponse, Response, Status};
pub use visitor::{DefaultRequestVisitor, RequestVisitor};
