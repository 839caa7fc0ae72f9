use chronicle_domain::{PluginContext, PluginResult};

/// A plugin's event handler. Implementations never propagate panics across
/// the dispatch boundary — the router catches failures per-plugin (§4.6
/// "Failure isolation").
#[async_trait::async_trait]
pub trait PluginHandler: Send + Sync {
    fn id(&self) -> &str;
    async fn handle(&self, ctx: PluginContext) -> PluginResult;
}
