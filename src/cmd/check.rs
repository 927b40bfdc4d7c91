use std::process::ExitCode;

use aclguard::context::{HttpContext, Invocation, QueryContext, SocketClient};
use aclguard::guard::factory::GuardFactory;
use aclguard::guard::Authorization;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, ValueEnum};
use serde_json::{json, Map, Value};

use super::{ConfigArgs, LogArgs, PrincipalArgs, RunCommand};

/// Decide one invocation of an operation the way the guard would, and print
/// the decision. Exits with 0 when allowed and 1 when denied.
#[derive(Args)]
pub struct CheckArgs {
    /// Name of the operation to invoke.
    pub operation: String,

    /// Transport the invocation arrives on.
    #[arg(short, long, default_value = "http")]
    pub transport: Transport,

    /// Operation arguments as a JSON object. Path parameters for http, resolver
    /// arguments for query, message data for socket and rpc.
    #[arg(short, long, default_value = "{}")]
    pub args: String,

    /// Print the decision with the principal, resolved subject and rules as
    /// JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub principal: PrincipalArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Transport {
    Http,
    Query,
    Socket,
    Rpc,
}

#[async_trait]
impl RunCommand for CheckArgs {
    async fn run(&self) -> Result<ExitCode> {
        self.log.init()?;
        let ps = self.config.build_path_set()?;

        let factory = GuardFactory::load(&ps)?;
        let guard = factory.build_guard().context("build guard")?;

        let principal = self.principal.parse()?;
        let args: Map<String, Value> =
            serde_json::from_str(&self.args).context("parse operation args, expect json object")?;

        let auth = match self.transport {
            Transport::Http => {
                let mut ctx = HttpContext::new();
                ctx.params = args;
                ctx.user = principal;
                guard
                    .authorize(&self.operation, Invocation::Http(&mut ctx))
                    .await?
            }
            Transport::Query => {
                let mut ctx = QueryContext::new();
                ctx.args = args;
                ctx.user = principal;
                guard
                    .authorize(&self.operation, Invocation::Query(&mut ctx))
                    .await?
            }
            Transport::Socket => {
                let mut client = SocketClient::new("aclguard-cli");
                client.user = principal;
                let data = Value::Object(args);
                let invocation = Invocation::Socket {
                    client: &mut client,
                    data: &data,
                };
                guard.authorize(&self.operation, invocation).await?
            }
            Transport::Rpc => {
                let mut context = Map::new();
                if let Some(principal) = principal {
                    let field = factory.config().principal_field.clone();
                    context.insert(field, principal.to_value());
                }
                let data = Value::Object(args);
                let invocation = Invocation::Rpc {
                    context: &context,
                    data: &data,
                };
                guard.authorize(&self.operation, invocation).await?
            }
        };

        if self.json {
            display_json(&auth)?;
        } else {
            println!("{}", auth.decision);
        }

        if auth.decision.is_allowed() {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    }
}

fn display_json(auth: &Authorization) -> Result<()> {
    let rules: Vec<String> = match auth.ability {
        Some(ref ability) => ability.rules().iter().map(|rule| rule.to_string()).collect(),
        None => vec![],
    };
    let value = json!({
        "allowed": auth.decision.is_allowed(),
        "decision": auth.decision.to_string(),
        "principal": auth.principal,
        "subject": auth.subject,
        "rules": rules,
    });
    let s = serde_json::to_string_pretty(&value).context("encode json")?;
    println!("{s}");
    Ok(())
}
