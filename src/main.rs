use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hsds_vol::{
    ConfigOverrides, Connector, CreateFlags, File, Group, GroupGet, GroupValue, Intent,
    IterOrder, Locator, PlistId, link, response::LinkValue,
};
use tracing_subscriber::EnvFilter;

/// Inspect and modify domains on an HSDS-style REST service.
///
/// Connection details come from the flags below, then HSDS_ENDPOINT / HSDS_USERNAME /
/// HSDS_PASSWORD, then ~/.hscfg.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Service base URL.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty domain, replacing any existing one.
    CreateDomain { domain: String },

    /// Create a group.
    Mkgroup {
        domain: String,
        path: String,

        /// Create missing intermediate groups.
        #[arg(long, default_value_t = false)]
        parents: bool,
    },

    /// Show link and attribute counts for a group.
    Info { domain: String, path: String },

    /// List the links in a group.
    Ls { domain: String, path: String },

    /// Delete a domain.
    RmDomain { domain: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = CliArgs::parse();

    let connector = Connector::with_overrides(ConfigOverrides {
        endpoint: args.endpoint,
        username: args.username,
        password: args.password,
    })
    .context("failed to configure the connector")?;

    let result = run(&connector, args.command);
    connector.term();
    result
}

fn run(connector: &Connector, command: Command) -> Result<()> {
    match command {
        Command::CreateDomain { domain } => {
            let flags = CreateFlags {
                truncate: true,
                exclusive: false,
            };
            let file = File::create(connector, &domain, flags, PlistId::DEFAULT, PlistId::DEFAULT)?;
            println!("{} {}", domain, file.uri());
            file.close()?;
        }
        Command::Mkgroup {
            domain,
            path,
            parents,
        } => {
            let file = File::open(connector, &domain, Intent::ReadWrite, PlistId::DEFAULT)?;
            let lcpl = connector.plists().link_create_list(parents)?;
            let created = Group::create(&file, Some(&path), lcpl, PlistId::DEFAULT, PlistId::DEFAULT);
            connector.plists().close(lcpl)?;
            let group = created.with_context(|| format!("failed to create group '{path}'"))?;
            println!("{} {}", path, group.uri());
            group.close()?;
            file.close()?;
        }
        Command::Info { domain, path } => {
            let file = File::open(connector, &domain, Intent::ReadOnly, PlistId::DEFAULT)?;
            let info = Group::open(&file, &path, PlistId::DEFAULT).and_then(|group| {
                let info = group.get(GroupGet::Info, Locator::BySelf);
                group.close()?;
                info
            });
            file.close()?;
            if let GroupValue::Info(info) = info? {
                println!("links:      {}", info.link_count);
                if let Some(count) = info.attribute_count {
                    println!("attributes: {count}");
                }
                if let Some(created) = info.created {
                    println!("created:    {created}");
                }
                if let Some(modified) = info.last_modified {
                    println!("modified:   {modified}");
                }
            }
        }
        Command::Ls { domain, path } => {
            let file = File::open(connector, &domain, Intent::ReadOnly, PlistId::DEFAULT)?;
            let links = link::list(&file, Some(&path), IterOrder::Name);
            file.close()?;
            for l in links? {
                let name = l.name.unwrap_or_default();
                match l.value {
                    LinkValue::Hard { uri, kind } => println!("{name}\t{kind}\t{uri}"),
                    LinkValue::Soft { path } => println!("{name}\tsoft\t{path}"),
                    LinkValue::External { domain, path } => {
                        println!("{name}\texternal\t{domain}:{path}")
                    }
                    LinkValue::UserDefined => println!("{name}\tuser-defined"),
                }
            }
        }
        Command::RmDomain { domain } => {
            File::delete(connector, &domain)?;
            tracing::info!("removed domain '{}'", domain);
        }
    }
    Ok(())
}
