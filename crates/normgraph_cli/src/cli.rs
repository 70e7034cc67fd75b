//! Command-line surface.

use clap::{Args, Parser, Subcommand, ValueEnum};
use normgraph_core::{ActionPlan, ActionPolicy, EntityClass};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "normgraph", version, about = "Normalized project store tooling")]
pub struct Cli {
    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "NORMGRAPH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for rolling log files; logging is off when unset.
    #[arg(long, global = true, env = "NORMGRAPH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a normalized store into a graph-encoded project store.
    Denormalise(DenormaliseArgs),
    /// Insert or update sources in a normalized store.
    EditSources(EditSourcesArgs),
}

/// Action applied to existing graph rows of one entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Skip,
    Replace,
    Merge,
}

impl From<PolicyArg> for ActionPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Skip => ActionPolicy::Skip,
            PolicyArg::Replace => ActionPolicy::Replace,
            PolicyArg::Merge => ActionPolicy::Merge,
        }
    }
}

#[derive(Debug, Args)]
pub struct DenormaliseArgs {
    /// Correct text for Windows codepoint shifting.
    #[arg(short = 'w', long = "windows")]
    pub correct_text: bool,

    /// Rebuild the target structure before writing.
    #[arg(short = 's', long)]
    pub structure: bool,

    #[arg(short = 'p', long, value_enum, default_value_t = PolicyArg::Replace)]
    pub project: PolicyArg,
    #[arg(long, value_enum, default_value_t = PolicyArg::Replace)]
    pub node_categories: PolicyArg,
    #[arg(short = 'n', long, value_enum, default_value_t = PolicyArg::Replace)]
    pub nodes: PolicyArg,
    #[arg(long, value_enum, default_value_t = PolicyArg::Replace)]
    pub node_attributes: PolicyArg,
    #[arg(long, value_enum, default_value_t = PolicyArg::Replace)]
    pub source_categories: PolicyArg,
    #[arg(long, value_enum, default_value_t = PolicyArg::Replace)]
    pub sources: PolicyArg,
    #[arg(long, value_enum, default_value_t = PolicyArg::Replace)]
    pub source_attributes: PolicyArg,
    #[arg(short = 't', long, value_enum, default_value_t = PolicyArg::Replace)]
    pub taggings: PolicyArg,
    #[arg(short = 'a', long, value_enum, default_value_t = PolicyArg::Replace)]
    pub annotations: PolicyArg,
    #[arg(short = 'u', long, value_enum, default_value_t = PolicyArg::Replace)]
    pub users: PolicyArg,

    /// Normalized store to read.
    pub infile: PathBuf,

    /// Graph store to write; defaults to the input path with extension `.nvivo`.
    pub outfile: Option<PathBuf>,
}

impl DenormaliseArgs {
    pub fn plan(&self) -> ActionPlan {
        [
            (EntityClass::Project, self.project),
            (EntityClass::NodeCategories, self.node_categories),
            (EntityClass::Nodes, self.nodes),
            (EntityClass::NodeAttributes, self.node_attributes),
            (EntityClass::SourceCategories, self.source_categories),
            (EntityClass::Sources, self.sources),
            (EntityClass::SourceAttributes, self.source_attributes),
            (EntityClass::Taggings, self.taggings),
            (EntityClass::Annotations, self.annotations),
            (EntityClass::Users, self.users),
        ]
        .into_iter()
        .fold(ActionPlan::default(), |plan, (class, policy)| {
            plan.with(class, policy.into())
        })
    }

    pub fn target(&self) -> PathBuf {
        self.outfile
            .clone()
            .unwrap_or_else(|| self.infile.with_extension("nvivo"))
    }
}

#[derive(Debug, Args)]
pub struct EditSourcesArgs {
    /// Limit number of rows read from the input file.
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Input columns to include as attributes; all when omitted.
    #[arg(short = 'C', long, num_args = 0..)]
    pub columns: Vec<String>,

    /// Input columns to exclude as attributes.
    #[arg(long, num_args = 0..)]
    pub exclude: Vec<String>,

    /// Input columns to include as coded text.
    #[arg(long = "textcolumns", num_args = 0..)]
    pub text_columns: Vec<String>,

    #[arg(short = 'n', long)]
    pub name: Option<String>,
    #[arg(short = 'd', long)]
    pub description: Option<String>,
    #[arg(short = 'c', long)]
    pub category: Option<String>,

    /// Attribute in `name:value` form; repeatable.
    #[arg(short = 'a', long = "attributes")]
    pub attributes: Vec<String>,

    #[arg(long)]
    pub color: Option<String>,

    /// File whose contents become the source text.
    #[arg(short = 's', long)]
    pub source: Option<PathBuf>,

    /// Source text.
    #[arg(short = 't', long)]
    pub text: Option<String>,

    /// User name; defaults to the project's last modifier.
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Do not write the comments log file.
    #[arg(long)]
    pub no_comments: bool,

    /// Normalized store to write.
    #[arg(short = 'o', long, required = true)]
    pub outfile: PathBuf,

    /// Input CSV file.
    pub infile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use normgraph_core::{ActionPolicy, EntityClass};
    use std::path::PathBuf;

    #[test]
    fn denormalise_defaults_to_replace_and_nvivo_target() {
        let cli = Cli::parse_from(["normgraph", "denormalise", "study.norm"]);
        let Command::Denormalise(args) = cli.command else {
            panic!("expected denormalise");
        };
        assert_eq!(args.target(), PathBuf::from("study.nvivo"));
        for class in EntityClass::ALL {
            assert_eq!(args.plan().policy_for(class), ActionPolicy::Replace);
        }
    }

    #[test]
    fn denormalise_reads_per_class_policies() {
        let cli = Cli::parse_from([
            "normgraph",
            "denormalise",
            "--windows",
            "--taggings",
            "skip",
            "--node-attributes",
            "merge",
            "in.norm",
            "out.nvivo",
        ]);
        let Command::Denormalise(args) = cli.command else {
            panic!("expected denormalise");
        };
        assert!(args.correct_text);
        let plan = args.plan();
        assert_eq!(plan.policy_for(EntityClass::Taggings), ActionPolicy::Skip);
        assert_eq!(plan.policy_for(EntityClass::NodeAttributes), ActionPolicy::Merge);
        assert_eq!(args.target(), PathBuf::from("out.nvivo"));
    }

    #[test]
    fn edit_sources_collects_repeated_attributes() {
        let cli = Cli::parse_from([
            "normgraph",
            "edit-sources",
            "-o",
            "out.norm",
            "-a",
            "Age:3",
            "-a",
            "Site:North",
            "--textcolumns",
            "Answer",
            "--",
            "in.csv",
        ]);
        let Command::EditSources(args) = cli.command else {
            panic!("expected edit-sources");
        };
        assert_eq!(args.attributes, vec!["Age:3", "Site:North"]);
        assert_eq!(args.text_columns, vec!["Answer"]);
        assert_eq!(args.infile, Some(PathBuf::from("in.csv")));
    }
}
