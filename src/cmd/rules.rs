use std::process::ExitCode;

use aclguard::guard::factory::GuardFactory;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;

use super::{ConfigArgs, LogArgs, PrincipalArgs, RunCommand};

/// Print the rules a principal receives, in definition order. Later rules take
/// precedence.
#[derive(Args)]
pub struct RulesArgs {
    /// Only print rules that apply to this action.
    #[arg(long)]
    pub action: Option<String>,

    /// Only print rules that apply to this subject type.
    #[arg(long)]
    pub subject: Option<String>,

    #[command(flatten)]
    pub principal: PrincipalArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

#[async_trait]
impl RunCommand for RulesArgs {
    async fn run(&self) -> Result<ExitCode> {
        self.log.init()?;
        let ps = self.config.build_path_set()?;

        let factory = GuardFactory::load(&ps)?;
        let principal = self.principal.parse()?;
        let ability = factory
            .build_ability_factory()
            .build(principal.as_ref())
            .await?;

        let rules = ability.rules().iter().filter(|rule| {
            let action_ok = match self.action {
                Some(ref action) => rule.matches_action(action),
                None => true,
            };
            let subject_ok = match self.subject {
                Some(ref subject) => rule.matches_subject_type(subject),
                None => true,
            };
            action_ok && subject_ok
        });

        let mut count = 0;
        for rule in rules {
            count += 1;
            println!("{rule}");
        }
        if count == 0 {
            println!("No rules");
        }

        Ok(ExitCode::SUCCESS)
    }
}
