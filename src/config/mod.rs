pub mod masking;
pub mod schema;

pub use masking::mask_config_secrets;
pub use schema::{
    AccountConfig, CatchingConfig, Config, NotificationConfig, OnboardingConfig,
    PredictionConfig, RarityConfig, ReliabilityConfig, SolverConfig,
};
