//! `config` subcommands. These never contact the backend.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            api_url,
            name,
            username,
            make_default,
        } => {
            let mut cfg = config::load_config_or_default();
            let profile = Profile {
                username,
                ..Profile::new(api_url)
            };
            // Fails early on a bad URL instead of at the next command.
            siac_config::profile_to_sync_config(&profile, &cfg.defaults)?;

            let first = cfg.profiles.is_empty();
            cfg.profiles.insert(name.clone(), profile);
            if make_default || first {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;

            output::print_status(
                &format!(
                    "Saved profile '{name}' to {}",
                    config::config_path().display()
                ),
                global.quiet,
                output::should_color(&global.color),
            );
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| c.default_profile.clone().unwrap_or_default(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let lines: Vec<String> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| {
                    let marker = if *name == active { "*" } else { " " };
                    format!("{marker} {name}\t{}", profile.api_url)
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}
