//! Host binding: ties an interpreter's signals to a host that renders on request.

pub mod component;

pub use component::SagaComponent;
