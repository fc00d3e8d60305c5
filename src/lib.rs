//! rentq: rent and deposit forecast lookups for Seoul listings
//!
//! A JSON HTTP service over a read-only SQLite snapshot of villa and
//! officetel contracts. Assembles prediction-input documents from user
//! queries, resolves per-quarter deposit and monthly-rent forecasts, and
//! fronts the remote NLP/LLM services behind the support chat widgets.

pub mod api;
pub mod assembler;
pub mod config;
pub mod document;
pub mod error;
pub mod listing;
pub mod llm;
pub mod nlp;
pub mod property;
pub mod quarter;
pub mod resolver;
pub mod store;
pub mod utils;

pub use api::{create_router, AppState};
pub use assembler::{build_prediction_input, UserQuery};
pub use config::Config;
pub use document::{MatchStatus, PredictionInput};
pub use error::{RentqError, Result};
pub use listing::ListingItem;
pub use llm::{interpret_prompt, GenerationOptions, LlamaClient};
pub use nlp::{ChatTask, PipelineRegistry};
pub use property::{ForecastGrid, ForecastKind, LeaseType, PropertyRecord};
pub use quarter::YearQuarter;
pub use resolver::{run_prediction_lookup, ResolverOutcome, ResolverPayload};
pub use store::{PropertyFilter, PropertyStore, SupportFilter, SupportStore};
