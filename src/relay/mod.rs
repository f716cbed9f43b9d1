//
// src/relay/mod.rs
//
mod relay;
mod error;
mod origin;

pub mod cors;
pub mod forward;
pub mod redirect;
pub mod translate;

pub use relay::Relay;
pub use error::{failure_response, RelayError};
pub use forward::{ForwardRules, ForwardSpec};
pub use origin::{OriginPolicy, TargetOrigin};
pub use translate::{classify, RelayBody, RelayResult};
