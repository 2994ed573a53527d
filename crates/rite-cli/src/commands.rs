use std::io::{self, BufRead, Write};

use anyhow::Context;
use colored::Colorize;
use rite_sdk::{
    ChronicleEntry, Confirmer, DiffLine, DiffStatus, Rites, UndoRequest,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let rites = Rites::open(&cli.root)
        .with_context(|| format!("opening project at {}", cli.root))?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::History(args) => cmd_history(&rites, args, json),
        Command::Undo(args) => cmd_undo(&rites, args, json),
        Command::Diff(args) => cmd_diff(&rites, args, json),
        Command::Show(args) => cmd_show(&rites, args, json),
        Command::RevertPatch(args) => {
            let patch = rites.forge_reverse_patch(&args.rite)?;
            emit(&patch.render(), args.output.as_deref())
        }
        Command::ApplyPatch(args) => cmd_apply_patch(&rites, args),
        Command::CherryPick(args) => emit(&rites.forge_cherry_pick(&args.rite)?, args.output.as_deref()),
        Command::Trash(args) => cmd_trash(&rites, args),
        Command::Config(_) => {
            print!("{}", toml::to_string_pretty(rites.config())?);
            Ok(())
        }
    }
}

fn emit(text: &str, output: Option<&str>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {path}"))?;
            println!("{} Wrote {}", "✓".green().bold(), path.bold());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_history(rites: &Rites, args: HistoryArgs, json: bool) -> anyhow::Result<()> {
    let history = rites.history(args.limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        println!("No rites recorded.");
        return Ok(());
    }
    for rite in &history {
        let marker = if rite.is_head { " (HEAD)".green().to_string() } else { String::new() };
        if args.oneline {
            println!("{} {}{}", rite.rite_id.short_id().yellow(), rite.rite_name, marker);
        } else {
            println!("{} #{}  {}{}", rite.rite_id.short_id().yellow().bold(), rite.sequence, rite.rite_name.bold(), marker);
            println!("  {}", rite.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed());
            println!(
                "  {} operations, {} changed, {} tracked, {} edicts",
                rite.operations, rite.changed, rite.tracked, rite.edicts
            );
            println!("  Fingerprint: {}", rite.fingerprint.short_hex().cyan());
        }
    }
    Ok(())
}

/// Asks on the terminal before anything is reversed.
struct Prompt;

impl Confirmer for Prompt {
    fn confirm(&self, rites: &[ChronicleEntry]) -> bool {
        println!("About to undo {} rite(s):", rites.len());
        for rite in rites {
            println!("  {} {} ({} operations)", rite.rite_id.short_id().yellow(), rite.rite_name, rite.operations);
        }
        print!("Proceed? [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn cmd_undo(rites: &Rites, args: UndoArgs, json: bool) -> anyhow::Result<()> {
    let request = UndoRequest {
        steps: args.steps,
        force: args.force,
        non_interactive: args.yes || json,
    };
    let report = rites.undo(request, &Prompt)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.declined {
        println!("Undo cancelled.");
        return Ok(());
    }
    println!(
        "{} Reversed {} rite(s), {} operations",
        "✓".green().bold(),
        report.reversed_rites.len(),
        report.operations_reversed
    );
    for skipped in &report.skipped_rites {
        println!("  {} {} (no ledger)", "skipped".yellow(), skipped.short_id());
    }
    if report.failures > 0 {
        println!("  {} {} operation(s) failed", "!".red().bold(), report.failures);
    }
    if report.orphans_purged > 0 {
        println!("  Purged {} orphan(s)", report.orphans_purged);
    }
    match report.new_head {
        Some(head) => println!("  HEAD is now {}", head.short_id().yellow()),
        None => println!("  HEAD is now {}", "genesis".cyan()),
    }
    Ok(())
}

fn cmd_diff(rites: &Rites, args: DiffArgs, json: bool) -> anyhow::Result<()> {
    let records = rites.diff(&args.newer, &args.baseline)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No changes.");
    }
    for record in &records {
        match record.status {
            DiffStatus::Created => println!("  {} {}", "created: ".green(), record.path),
            DiffStatus::Deleted => println!("  {} {}", "deleted: ".red(), record.path),
            DiffStatus::Modified => println!("  {} {}", "modified:".yellow(), record.path),
        }
    }
    Ok(())
}

fn cmd_show(rites: &Rites, args: ShowArgs, json: bool) -> anyhow::Result<()> {
    let record = rites.show(&args.rite)?;
    let entry = &record.entry;
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }
    println!("Rite {} #{}  {}", entry.rite_id.to_string().yellow().bold(), entry.sequence, entry.rite_name.bold());
    match entry.parent {
        Some(parent) => println!("Parent: {}", parent.short_id()),
        None => println!("Parent: {}", "genesis".cyan()),
    }
    println!("Sealed: {}", entry.timestamp.to_rfc3339());
    println!("Fingerprint: {}", entry.fingerprint.to_hex().cyan());
    for (name, value) in &entry.variables_delta {
        println!("  $$ {name} = {value}");
    }

    match &record.ledger {
        Some(ledger) => {
            println!("\nLedger ({} entries):", ledger.len());
            for e in &ledger.entries {
                let flag = if e.reversible { "↺".green() } else { "✗".red() };
                println!("  {flag} {}", e.forward.describe());
            }
        }
        None => println!("\n{}", "No ledger recorded.".yellow()),
    }

    if args.patch && record.ledger.is_some() {
        for file in rites.content_diff(&args.rite)? {
            println!("\n{} {}", "---".bold(), file.path.bold());
            for hunk in &file.diff.hunks {
                println!(
                    "{}",
                    format!("@@ -{},{} +{},{} @@", hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count).cyan()
                );
                for line in &hunk.lines {
                    match line {
                        DiffLine::Context(text) => println!(" {text}"),
                        DiffLine::Added(text) => println!("{}", format!("+{text}").green()),
                        DiffLine::Removed(text) => println!("{}", format!("-{text}").red()),
                    }
                }
            }
        }
    }
    Ok(())
}

fn cmd_apply_patch(rites: &Rites, args: ApplyPatchArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file))?;
    let report = rites.apply_reverse_patch(&text)?;
    println!("{} Applied {} as rite {}", "✓".green().bold(), args.file.bold(), report.rite_id.short_id().yellow());
    println!("  {} operations", report.ledger.len());
    if let Some(fingerprint) = report.fingerprint() {
        println!("  Fingerprint: {}", fingerprint.short_hex().cyan());
    }
    Ok(())
}

fn cmd_trash(rites: &Rites, args: TrashArgs) -> anyhow::Result<()> {
    match args.action {
        TrashAction::List { rite } => {
            let items = rites.trash_list(&rite)?;
            if items.is_empty() {
                println!("Trash is empty.");
            }
            for item in &items {
                println!("  {} → {}", item.original_path.bold(), item.trash_path.dimmed());
            }
        }
        TrashAction::Restore { rite, path } => {
            let items = rites.trash_list(&rite)?;
            let selected: Vec<_> = items
                .iter()
                .filter(|item| path.as_deref().map_or(true, |p| item.original_path == p))
                .collect();
            if selected.is_empty() {
                anyhow::bail!("nothing to restore for {}", path.as_deref().unwrap_or(&rite));
            }
            for item in selected {
                rites.restore_from_trash(item)?;
                println!("  {} {}", "restored".green(), item.original_path);
            }
        }
    }
    Ok(())
}
