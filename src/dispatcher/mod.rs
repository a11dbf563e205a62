//! Request Dispatcher.
mod request_dispatcher;

pub use request_dispatcher::*;

#[cfg(test)]
mod dispatcher_test;
