pub mod gateway;
pub mod setup;
pub mod ua;

pub use gateway::{
    BrowserMode, BrowserSession, CapturedMedia, ChallengeDetector, Document, DomainManager,
    ExitCondition, Gateway, GatewayConfig, GatewayError, HttpExecutor, HttpResponse,
    ParsedEpisode, ParsedItem, ParsedLoadData, Parser, ReqwestExecutor, RequestQueue,
    RequestResult, ScriptedBrowserEngine, SessionState, SessionStore,
};
