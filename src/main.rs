use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wikipad::{
    Config,
    DataDir,
    Error,
    PageUpdate,
    Result,
    Wiki,
    cli::{
        self,
        Cli,
        Command,
        PageAction,
        PasswordArgs,
        UserAction,
    },
    codec,
    ingestion,
    output,
    sync::{self, DirectorySync},
    user::User,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("WIKIPAD_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_path = cli.config.unwrap_or_else(|| data_dir.config_file());
    let config = Config::load(&config_path)?;
    let wiki = Wiki::open(&data_dir, &config)?;

    match cli.command {
        Command::Page { action } => cmd_page(&wiki, action)?,
        Command::Search(args) => {
            let request = args.params().into_request()?;
            let results = wiki.search(&request)?;
            if args.json {
                println!("{}", output::json(&results)?);
            } else {
                print!("{}", output::search_human(&results, request.from));
            }
        }
        Command::Tags(args) => {
            let tags = wiki.tag_counts(args.limit)?;
            if args.json {
                println!("{}", output::json(&tags)?);
            } else {
                print!("{}", output::tags_human(&tags));
            }
        }
        Command::Tag(args) => {
            let hits = wiki.pages_with_tag(&args.tag)?;
            if args.json {
                println!("{}", output::json(&hits)?);
            } else {
                print!("{}", output::tagged_pages_human(&args.tag, &hits));
            }
        }
        Command::User { action } => cmd_user(&wiki, action)?,
        Command::Reindex => {
            let report = wiki.reindex()?;
            eprintln!("Indexed {} page(s).", report.pages);
        }
        Command::Check(args) => cmd_check(&wiki, &args)?,
        Command::Import(args) => {
            let dir = wiki_dir(args.dir, &config)?;
            let report = ingestion::import_dir(&wiki, &dir)?;
            eprintln!(
                "Imported {} page(s), skipped {} file(s).",
                report.imported, report.skipped
            );
            if report.stale > 0 {
                eprintln!(
                    "Warning: {} page(s) were stored but not indexed; run `wikipad reindex`.",
                    report.stale
                );
            }
        }
        Command::Export(args) => {
            let dir = wiki_dir(args.dir, &config)?;
            let count = ingestion::export_dir(&wiki, &dir)?;
            eprintln!("Exported {count} page(s) to {}", dir.display());
        }
        Command::Sync(args) => {
            let dir = wiki_dir(args.dir, &config)?;
            let interval = args
                .interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.sync_interval());
            cmd_sync(wiki, dir, interval, args.once)?;
        }
        Command::Status(args) => {
            let status = wiki.status()?;
            if args.json {
                println!("{}", output::json(&status)?);
            } else {
                print!("{}", output::status_human(data_dir.root(), &status));
            }
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

// -- Pages --

fn cmd_page(wiki: &Wiki, action: PageAction) -> Result<()> {
    match action {
        PageAction::Get { slug, json, raw } => {
            let page = wiki
                .get_page(&slug)?
                .ok_or_else(|| Error::not_found("page", &slug))?;
            if json {
                println!("{}", output::json(&page)?);
            } else if raw {
                print!("{}", codec::encode(&page.to_update())?);
            } else {
                print!("{}", output::page_human(&slug, &page));
            }
        }
        PageAction::Put(args) => cmd_put(wiki, args)?,
        PageAction::Delete { slug } => {
            if !wiki.delete_page(&slug)? {
                return Err(Error::not_found("page", slug));
            }
            eprintln!("Deleted '{slug}'");
        }
        PageAction::Rename { old, new } => {
            wiki.rename_page(&old, &new)?;
            eprintln!("Renamed '{old}' -> '{new}'");
        }
        PageAction::List { glob, json } => {
            let mut slugs = wiki.list_pages()?;
            if let Some(pattern) = glob {
                let matcher = globset::Glob::new(&pattern)
                    .map_err(|e| {
                        Error::Config(format!("invalid glob pattern: {e}"))
                    })?
                    .compile_matcher();
                slugs.retain(|slug| matcher.is_match(slug));
            }
            if json {
                println!("{}", output::json(&slugs)?);
            } else {
                for slug in &slugs {
                    println!("{slug}");
                }
            }
        }
    }
    Ok(())
}

fn cmd_put(wiki: &Wiki, args: cli::PutArgs) -> Result<()> {
    let input = match &args.file {
        Some(path) => std::fs::read(path)?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let mut update = if args.json {
        PageUpdate::from_json(&input)?
    } else {
        let text = String::from_utf8(input).map_err(|_| {
            Error::Validation("page input is not valid UTF-8".to_string())
        })?;
        codec::decode(&text)?
    };
    if let Some(title) = args.title {
        update.title = title;
    }
    if !args.tags.is_empty() {
        update.tags = args.tags;
    }

    let page = wiki.put_page(&args.slug, update)?;
    eprintln!(
        "Saved '{}' ({})",
        args.slug,
        page.metadata.modified.to_rfc3339()
    );
    Ok(())
}

// -- Users --

fn cmd_user(wiki: &Wiki, action: UserAction) -> Result<()> {
    let store = wiki.store();
    match action {
        UserAction::Add {
            username,
            admin,
            password,
        } => {
            let password = read_password(password)?;
            store.create_user(&User::new(&username, &password, admin)?)?;
            eprintln!("Added user '{username}'");
        }
        UserAction::Passwd { username, password } => {
            let mut user = store
                .get_user(&username)?
                .ok_or_else(|| Error::not_found("user", &username))?;
            user.set_password(&read_password(password)?)?;
            store.update_user(&user)?;
            eprintln!("Updated password for '{username}'");
        }
        UserAction::Remove { username } => {
            if !store.delete_user(&username)? {
                return Err(Error::not_found("user", username));
            }
            eprintln!("Removed user '{username}'");
        }
        UserAction::List { json } => {
            let users = store.list_users()?;
            if json {
                let summaries: Vec<_> =
                    users.iter().map(output::UserSummary::from).collect();
                println!("{}", output::json(&summaries)?);
            } else {
                print!("{}", output::users_human(&users));
            }
        }
        UserAction::Verify { username, password } => {
            let password = read_password(password)?;
            match store.authenticate(&username, &password)? {
                Some(user) if user.admin => println!("ok (admin)"),
                Some(_) => println!("ok"),
                None => {
                    return Err(Error::Credential(
                        "invalid username or password".to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// The `--password` value, or the first line of stdin.
fn read_password(args: PasswordArgs) -> Result<String> {
    if let Some(password) = args.password {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".to_string()));
    }
    Ok(password)
}

// -- Maintenance --

fn cmd_check(wiki: &Wiki, args: &cli::CheckArgs) -> Result<()> {
    let report = wiki.check_consistency()?;
    if args.json {
        println!("{}", output::json(&report)?);
    } else {
        print!("{}", output::drift_human(&report));
    }

    if report.is_consistent() {
        return Ok(());
    }
    if args.repair {
        let rebuilt = wiki.reindex()?;
        eprintln!("Rebuilt index with {} page(s).", rebuilt.pages);
        Ok(())
    } else {
        eprintln!("Run `wikipad check --repair` or `wikipad reindex` to fix.");
        Err(report.into_error())
    }
}

fn wiki_dir(explicit: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    explicit.or_else(|| config.wiki_dir.clone()).ok_or_else(|| {
        Error::Config(
            "no page directory given and wiki_dir is not configured"
                .to_string(),
        )
    })
}

fn check_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            dir.display()
        )));
    }
    Ok(())
}

fn cmd_sync(
    wiki: Wiki,
    dir: PathBuf,
    interval: Duration,
    once: bool,
) -> Result<()> {
    check_dir(&dir)?;

    if once {
        let report = DirectorySync::new(&dir).scan(&wiki)?;
        eprintln!(
            "Wrote {}, reprojected {}, deleted {}, skipped {}.",
            report.written, report.reprojected, report.deleted, report.skipped
        );
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start tokio runtime: {e}")))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });
        sync::run(Arc::new(wiki), dir, interval, shutdown_rx).await
    })
}
