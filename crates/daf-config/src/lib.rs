//! Layered configuration for DevAIFlow.
//!
//! Configuration is merged from up to five layers. Precedence, highest
//! first: enterprise, organization, team, user, session-local overrides.
//! Each layer is a sparse JSON document; a field set in a higher layer
//! always wins.

pub mod backend;
pub mod error;
pub mod fields;
pub mod paths;
pub mod settings;
pub mod suggest;

pub use backend::BackendConfig;
pub use error::{ConfigError, Result};
pub use fields::{CommentVisibility, FieldCatalog, FieldSpec, VisibilityKind};
pub use settings::{
    AuthType, FailurePolicy, PromptChoice, PromptsPolicy, Settings, SettingsLayer, SummaryMode,
    TransitionPolicy,
};
