//! Subcommand execution

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use dwords_core::{
    keys, DWordsConfig, DictionaryProvider, NewPlan, NullDictionary, Plan, PlanId, RecordStore,
    SettingsStore, SqliteDictionary, SqliteRecordStore, StoreError, SyncBatch, Version, Word,
    WordPatch,
};

use crate::{
    Cli, Commands, DictCommands, PlanArg, PlanCommands, SettingsCommands, SyncCommands,
    WordCommands,
};

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

struct Context {
    config: DWordsConfig,
    store: SqliteRecordStore,
    json: bool,
}

impl Context {
    fn open(cli: &Cli) -> CliResult<Self> {
        let mut config = match &cli.config {
            Some(path) => DWordsConfig::load(path)?,
            None => DWordsConfig::load_default()?,
        };
        if let Some(db) = &cli.db {
            config.database_path = Some(db.clone());
        }
        tracing::debug!("Opening store at {:?}", config.database_path());
        let store = SqliteRecordStore::open(&config)?;
        Ok(Self {
            config,
            store,
            json: cli.json,
        })
    }

    fn dictionary(&self) -> CliResult<Box<dyn DictionaryProvider>> {
        let path = self.config.dictionary_path();
        if !path.exists() {
            tracing::warn!("No dictionary database at {:?}", path);
            return Ok(Box::new(NullDictionary));
        }
        Ok(Box::new(SqliteDictionary::open(
            &path,
            self.config.dictionaries.clone(),
        )?))
    }

    fn plan(&self, arg: &PlanArg) -> CliResult<PlanId> {
        match arg.plan {
            Some(id) => Ok(id),
            None => self
                .store
                .current_plan()?
                .ok_or_else(|| StoreError::NotFound("current plan (use --plan)".to_string()).into()),
        }
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> CliResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(())
    }
}

pub fn run(cli: Cli) -> CliResult<()> {
    let ctx = Context::open(&cli)?;
    match cli.command {
        Commands::Plan { command } => run_plan(&ctx, command),
        Commands::Word { command } => run_word(&ctx, command),
        Commands::Dict { command } => run_dict(&ctx, command),
        Commands::Settings { command } => run_settings(&ctx, command),
        Commands::Sync { command } => run_sync(&ctx, command),
    }
}

fn plan_line(plan: &Plan, current: Option<PlanId>) -> String {
    let marker = if Some(plan.id) == current { "*" } else { " " };
    format!("{} {}  {}", marker, plan.id, plan.name)
}

fn word_line(word: &Word) -> String {
    let mut line = format!("{:>5}  {}", word.time, word.word);
    if !word.paraphrase.is_empty() {
        line.push_str("  ");
        line.push_str(&word.paraphrase);
    }
    if word.deleted {
        line.push_str("  (deleted)");
    }
    line
}

fn run_plan(ctx: &Context, command: PlanCommands) -> CliResult<()> {
    let store = &ctx.store;
    match command {
        PlanCommands::New {
            name,
            tag,
            dictionary,
            order,
            import,
        } => {
            let request = match (tag, import) {
                (Some(tag), _) => {
                    let dictionary = match dictionary {
                        Some(id) => id,
                        None => store.dictionary()?,
                    };
                    NewPlan::library(name, dictionary, tag, order)
                }
                (None, Some(path)) => NewPlan::import(name, path),
                (None, None) => NewPlan::blank(name),
            };
            let provider = ctx.dictionary()?;
            let id = store.create_plan_from(&request, provider.as_ref())?;
            let count = store.count_words(id)?;
            ctx.print(&serde_json::json!({ "id": id, "words": count }), || {
                format!("Created plan {} with {} words", id, count)
            })
        }
        PlanCommands::List => {
            let plans = store.list_plans()?;
            let current = store.current_plan()?;
            ctx.print(&plans, || {
                plans
                    .iter()
                    .map(|p| plan_line(p, current))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        PlanCommands::Rename { id, name } => {
            store.rename_plan(id, &name)?;
            ctx.print(&Value::Null, String::new)
        }
        PlanCommands::Delete { id } => {
            store.soft_delete_plan(id)?;
            ctx.print(&Value::Null, String::new)
        }
        PlanCommands::Select { id, none } => {
            let target = if none { None } else { id };
            store.select_plan(target)?;
            ctx.print(&target, String::new)
        }
        PlanCommands::Current => {
            let plan = match store.current_plan()? {
                Some(id) => store.get_plan(id)?,
                None => None,
            };
            ctx.print(&plan, || match &plan {
                Some(p) => format!("{}  {}", p.id, p.name),
                None => "No plan selected".to_string(),
            })
        }
    }
}

fn run_word(ctx: &Context, command: WordCommands) -> CliResult<()> {
    let store = &ctx.store;
    match command {
        WordCommands::Add {
            word,
            paraphrase,
            time,
            plan,
        } => {
            let plan_id = ctx.plan(&plan)?;
            let time = match time {
                Some(t) => t,
                None => store.next_word_time(plan_id)?,
            };
            let added = store.add_word(plan_id, &word, time, &paraphrase)?;
            if !added {
                return Err(StoreError::DuplicateWord {
                    plan_id: plan_id.to_string(),
                    word,
                }
                .into());
            }
            ctx.print(&store.get_word(plan_id, &word)?, String::new)
        }
        WordCommands::List {
            view,
            max_current,
            plan,
        } => {
            let plan_id = ctx.plan(&plan)?;
            let max_current = match max_current {
                Some(n) => n,
                None => store.max_current()?,
            };
            let words = store.list_words(plan_id, view.into(), max_current)?;
            ctx.print(&words, || {
                words.iter().map(word_line).collect::<Vec<_>>().join("\n")
            })
        }
        WordCommands::Show { word, plan } => {
            let plan_id = ctx.plan(&plan)?;
            let found = store
                .get_word(plan_id, &word)?
                .ok_or_else(|| StoreError::NotFound(format!("word {}/{}", plan_id, word)))?;
            ctx.print(&found, || {
                format!(
                    "{}\n  paraphrase: {}\n  status: {}\n  color: {}\n  version: {} ({})",
                    word_line(&found),
                    found.paraphrase,
                    found.status,
                    found.color,
                    found.version,
                    found.origin
                )
            })
        }
        WordCommands::Update {
            word,
            rename,
            time,
            paraphrase,
            show_paraphrase,
            color,
            status,
            plan,
        } => {
            let plan_id = ctx.plan(&plan)?;
            let patch = WordPatch {
                word: rename,
                time,
                paraphrase,
                show_paraphrase,
                color,
                status: status.map(Into::into),
            };
            let updated = store.update_word(plan_id, &word, &patch)?;
            ctx.print(&updated, || word_line(&updated))
        }
        WordCommands::Delete { word, plan } => {
            let plan_id = ctx.plan(&plan)?;
            store.delete_word(plan_id, &word)?;
            ctx.print(&Value::Null, String::new)
        }
        WordCommands::Purge { word, plan } => {
            let plan_id = ctx.plan(&plan)?;
            let purged = store.purge_word(plan_id, &word)?;
            ctx.print(&purged, || {
                if purged {
                    format!("Purged {}", word)
                } else {
                    format!("No tombstone for {}", word)
                }
            })
        }
    }
}

fn run_dict(ctx: &Context, command: DictCommands) -> CliResult<()> {
    let provider = ctx.dictionary()?;
    match command {
        DictCommands::Lookup { word, dictionary } => {
            let id = match dictionary {
                Some(id) => id,
                None => ctx.store.dictionary()?,
            };
            let paraphrase = provider.lookup_paraphrase(&id, &word)?;
            ctx.print(&paraphrase, || {
                paraphrase
                    .clone()
                    .unwrap_or_else(|| format!("{}: not found", word))
            })
        }
        DictCommands::Search { prefix, dictionary } => {
            let id = match dictionary {
                Some(id) => id,
                None => ctx.store.dictionary()?,
            };
            let words = provider.prefix_search(&id, &prefix)?;
            ctx.print(&words, || words.join("\n"))
        }
    }
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run_settings(ctx: &Context, command: SettingsCommands) -> CliResult<()> {
    match command {
        SettingsCommands::Get { key } => {
            let value = ctx.store.get_setting(&key)?;
            ctx.print(&value, || match &value {
                Some(v) => v.to_string(),
                None => format!("{}: unset", key),
            })
        }
        SettingsCommands::Set { key, value } => {
            let value = parse_setting_value(&value);
            let mut update = BTreeMap::new();
            update.insert(key.clone(), value);
            ctx.store.update_settings(update)?;
            if key == keys::MAX_CURRENT {
                tracing::info!("Window size now {}", ctx.store.max_current()?);
            }
            ctx.print(&Value::Null, String::new)
        }
    }
}

fn read_batch(input: Option<&Path>) -> CliResult<SyncBatch> {
    let raw = match input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn run_sync(ctx: &Context, command: SyncCommands) -> CliResult<()> {
    match command {
        SyncCommands::Export { since, out } => {
            let batch = ctx.store.export_changes(Version(since))?;
            let json = serde_json::to_string_pretty(&batch)?;
            match out {
                Some(path) => {
                    fs::write(&path, json)?;
                    eprintln!("Exported {} records to {}", batch.len(), path.display());
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{}", json)?;
                }
            }
            Ok(())
        }
        SyncCommands::Apply { input } => {
            let batch = read_batch(input.as_deref())?;
            let report = ctx.store.apply_batch(&batch)?;
            ctx.print(&report, || {
                format!(
                    "inserted {}, updated {}, discarded {}, conflicts {}",
                    report.inserted, report.updated, report.discarded, report.conflicts
                )
            })
        }
    }
}
