use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use poolnode_core::{JobContext, Node, NodeConfig, Runner, RunnerError};
use poolnode_model::{JobFilter, NodeMeta, RunnerConfig, RunnerMeta};
use poolnode_observe::{LoggerConfig, logger_init};

/// Bumped whenever the transformation changes, so stale cache entries are ignored.
const CACHE_VERSION: u64 = 1;

struct EchoRunner {
    cfg: RunnerConfig,
}

impl EchoRunner {
    fn new() -> Self {
        let meta = RunnerMeta::new(5003, "Echo")
            .with_description("Echoes every text input back, upper-cased when asked to shout")
            .with_tags(["tool", "demo"]);
        let cfg = RunnerConfig::new(meta)
            .with_filter(JobFilter::new().run_on("echo"))
            .with_sockets(json!({
                "in": {"shout": {"type": "boolean", "default": false}},
                "out": {"output": {"type": "string"}}
            }));
        Self { cfg }
    }
}

fn cache_key(shout: bool, text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("echo-{}-{:016x}", u8::from(shout), hasher.finish())
}

#[async_trait]
impl Runner for EchoRunner {
    fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    async fn init(&self, node: &NodeMeta) -> Result<(), RunnerError> {
        info!(node = %node.name, "echo runner ready");
        Ok(())
    }

    async fn can_run(&self, ctx: &JobContext) -> Result<bool, RunnerError> {
        Ok(ctx.input(None).is_some())
    }

    async fn run(&self, ctx: &JobContext) -> Result<String, RunnerError> {
        let shout = ctx.param_value("shout") == Some("true");
        let disk = ctx.create_storage(Some("echo"), None, false).await?;

        let mut echoed = Vec::new();
        for (i, input) in ctx.inputs(None).into_iter().enumerate() {
            let key = cache_key(shout, &input.data);
            let text = match ctx.cache().get_json::<String>(&key, CACHE_VERSION, true).await {
                Some(hit) => hit,
                None => {
                    let text = if shout { input.data.to_uppercase() } else { input.data.clone() };
                    ctx.cache().set_json(&key, &text, CACHE_VERSION, 0, true).await;
                    text
                }
            };
            disk.write_utf8(&format!("input-{i}.txt"), &input.data).await?;
            echoed.push(text);
        }

        ctx.logger()
            .info(format!("echoed {} inputs into {}", echoed.len(), disk.url()));
        let output = json!({ "echo": echoed, "disk": disk.url() });
        Ok(serde_json::to_string(&output).map_err(anyhow::Error::from)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = |key: &str| std::env::var(key).ok();
    let defaults = NodeMeta::default();
    let name = env("NODE_NAME").unwrap_or(defaults.name);
    let version = env("NODE_VERSION").unwrap_or(defaults.version);

    logger_init(&LoggerConfig::from_lookup(env, &name, &version))?;
    info!("logger initialized");

    let node = Node::connect(NodeConfig::from_lookup(env))?;
    node.register_runner(Arc::new(EchoRunner::new())).await;
    let handle = node.start();

    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    handle.shutdown().await;

    Ok(())
}
