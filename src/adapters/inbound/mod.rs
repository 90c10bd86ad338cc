mod api_server;

pub use api_server::{router, ApiError, ApiServer, ApiState, HealthResponse, SaveRequest};
