pub mod dialogflow;
pub mod end_detection;
pub mod flatten;
pub mod gateway;
pub mod google_auth;

pub use dialogflow::{DialogflowCredentials, DialogflowCxClient, DialogflowCxConfig};
pub use end_detection::{EndFlags, detect_end};
pub use flatten::{flatten_parameters, flatten_value};
pub use gateway::{NluError, NluGateway, NluGatewayFuture, TurnMeta, TurnResult};
pub use google_auth::{ServiceAccountCredentials, ServiceAccountTokenSource};
