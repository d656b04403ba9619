use thiserror::Error;

/// Failure modes at the model-arbiter boundary.
///
/// The orchestrator maps every variant to a conservative deny; the variants
/// exist so the deny reason names the actual cause.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("no judgment-service credential configured")]
    MissingCredential,

    #[error("judgment request failed: {0}")]
    Transport(String),

    #[error("judgment service returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("judgment service returned an empty response")]
    EmptyResponse,

    #[error("judgment response violated the allow/deny schema: {0}")]
    InvalidSchema(String),
}
