mod discovery;
mod framework;
mod metadata;
mod target;

pub use discovery::{DiscoveryError, discover_targets};
pub use framework::Framework;
pub use metadata::{
    ConfigurationFile, ConfigurationFileError, Options, ProjectOptions, RunSettings,
    VOLLEY_CONFIG_FILE_NAME, VolleyTomlError,
};
pub use target::{ProjectTarget, TestCommand};
