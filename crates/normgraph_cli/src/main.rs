//! `normgraph` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments and map them onto core run options.
//! - Own process concerns: logging setup, the import comment log, exit
//!   status.

mod cli;
mod comment_log;
mod tabular;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, DenormaliseArgs, EditSourcesArgs};
use comment_log::ArgValue;
use log::info;
use normgraph_core::{
    default_log_level, init_logging, open_graph_db, open_norm_db, run_import, run_transcode,
    ImportOptions, TranscodeOptions,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    info!(
        "event=cli_start module=cli status=ok version={}",
        normgraph_core::core_version()
    );
    match cli.command {
        Command::Denormalise(args) => denormalise(&args),
        Command::EditSources(args) => edit_sources(&args),
    }
}

fn denormalise(args: &DenormaliseArgs) -> Result<()> {
    let target = args.target();
    let norm = open_norm_db(&args.infile)
        .with_context(|| format!("failed to open `{}`", args.infile.display()))?;
    let mut graph = open_graph_db(&target)
        .with_context(|| format!("failed to open `{}`", target.display()))?;

    let options = TranscodeOptions {
        plan: args.plan(),
        correct_text: args.correct_text,
        rebuild_structure: args.structure,
    };
    let report = run_transcode(&norm, &mut graph, &options)?;

    for class in &report.classes {
        eprintln!(
            "{:<18} {:<8} deleted={} inserted={}",
            class.class.as_str(),
            class.policy.as_str(),
            class.deleted,
            class.inserted
        );
    }
    Ok(())
}

fn edit_sources(args: &EditSourcesArgs) -> Result<()> {
    let input = args
        .infile
        .as_deref()
        .map(tabular::read_csv)
        .transpose()?;

    if !args.no_comments {
        let comments = input
            .as_ref()
            .map(|input| input.comments.as_slice())
            .unwrap_or_default();
        let log_path = comment_log::log_path(&args.outfile);
        let text = comment_log::render(
            &args.outfile.display().to_string(),
            &program_name(),
            &recorded_args(args),
            comments,
        );
        std::fs::write(&log_path, text)
            .with_context(|| format!("failed to write `{}`", log_path.display()))?;
        info!(
            "event=comment_log_write module=cli status=ok comment_lines={}",
            comments.len()
        );
    }

    let options = ImportOptions {
        limit: args.limit,
        columns: args.columns.clone(),
        exclude: args.exclude.clone(),
        text_columns: args.text_columns.clone(),
        name: args.name.clone(),
        description: args.description.clone(),
        category: args.category.clone(),
        color: args.color.clone(),
        source: args.source.clone(),
        text: args.text.clone(),
        user: args.user.clone(),
        attributes: args.attributes.clone(),
        project_title: args
            .infile
            .as_ref()
            .map(|path| path.display().to_string()),
    };

    let mut norm = open_norm_db(&args.outfile)
        .with_context(|| format!("failed to open `{}`", args.outfile.display()))?;
    let report = run_import(&mut norm, input, &options)?;

    eprintln!(
        "rows={} inserted={} updated={} attributes_registered={} taggings={}",
        report.rows,
        report.sources_inserted,
        report.sources_updated,
        report.attributes_registered,
        report.taggings_written
    );
    Ok(())
}

fn recorded_args(args: &EditSourcesArgs) -> Vec<(&'static str, ArgValue)> {
    vec![
        ("infile", args.infile.as_deref().into()),
        ("limit", args.limit.into()),
        ("columns", ArgValue::List(args.columns.clone())),
        ("exclude", ArgValue::List(args.exclude.clone())),
        ("textcolumns", ArgValue::List(args.text_columns.clone())),
        ("name", args.name.clone().into()),
        ("description", args.description.clone().into()),
        ("category", args.category.clone().into()),
        ("attributes", ArgValue::List(args.attributes.clone())),
        ("color", args.color.clone().into()),
        ("source", args.source.as_deref().into()),
        ("text", args.text.clone().into()),
        ("user", args.user.clone().into()),
        ("no-comments", ArgValue::Flag(args.no_comments)),
        ("outfile", Some(args.outfile.as_path()).into()),
    ]
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(std::path::Path::new)
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "normgraph".to_string())
}
