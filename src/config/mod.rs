mod loader;

pub use loader::{
    Config, DeadCodeConfig, DuplicateConfig, EnvironmentCommands, ManifestConfig,
    VerificationConfig,
};
pub(crate) use loader::glob_match;
