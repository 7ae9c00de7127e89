//! Command-line interface.

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;

use crate::orchestrator::Orchestrator;
use crate::tools::ToolRegistry;

#[derive(Debug, Parser)]
#[command(
    name = "courtside",
    version,
    about = "Tennis chat backend: an LLM answers questions with live sports-data tools"
)]
pub struct Cli {
    /// Config file (defaults to ~/.courtside/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (the default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask one question from the terminal
    Ask {
        query: String,
        /// Print the answer as it streams in
        #[arg(long)]
        stream: bool,
    },
    /// Print the tool catalogue
    Tools,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run_ask(orchestrator: &Orchestrator, query: &str, stream: bool) -> Result<()> {
    if stream {
        let mut fragments = orchestrator.respond_stream(query, &[]);
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            write!(stdout, "{}", fragment)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let reply = orchestrator.respond(query, &[]).await;
    println!("{}", reply.response);
    if let Some(sources) = reply.sources {
        println!("\nSources: {}", sources.join(", "));
    }
    Ok(())
}

/// Human-readable listing of every tool and its parameters.
pub fn render_catalogue(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    for schema in registry.schemas() {
        out.push_str(&format!("{}  [{}]\n", schema.name, schema.source_id));
        out.push_str(&format!("    {}\n", schema.description));
        for p in &schema.parameters {
            out.push_str(&format!(
                "    - {} ({}{}): {}\n",
                p.name,
                format!("{:?}", p.param_type).to_lowercase(),
                if p.required { ", required" } else { "" },
                p.description
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sports::fake::FakeSportsData;
    use crate::tools::create_default_registry;
    use crate::tools::testing::services;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["courtside", "ask", "who won?", "--stream"]);
        match cli.command {
            Some(Commands::Ask { query, stream }) => {
                assert_eq!(query, "who won?");
                assert!(stream);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::parse_from(["courtside", "--config", "/tmp/c.toml"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_catalogue_lists_every_tool() {
        let registry = create_default_registry(services(FakeSportsData::new()));
        let text = render_catalogue(&registry);
        assert!(text.contains("get_h2h_events  [tennis_api: get_h2h_events]"));
        assert!(text.contains("- ranking_type (string, required)"));
        assert!(text.contains("perform_web_search  [web_search: perform_web_search]"));
    }
}
