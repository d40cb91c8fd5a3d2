//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod info;
mod maintenance;
mod revisions;
mod serve;
mod setters;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::helpers::{DeletedDocs, IdSet, Selection};
use crate::config::load_settings;
use crate::repository::DocStore;

#[derive(Parser)]
#[command(name = "bibdocfile")]
#[command(about = "Manage the documents and files attached to records")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Match records by id, e.g. --recids=1-3,5
    #[arg(short, long, global = true)]
    recids: Option<IdSet>,

    /// Match documents by id, e.g. --docids=10-12
    #[arg(short, long, global = true)]
    docids: Option<IdSet>,

    /// Match every record
    #[arg(short, long, global = true)]
    all: bool,

    /// Match documents by name (`*` is a wildcard)
    #[arg(long, global = true)]
    with_docname: Option<String>,

    /// Match documents by doctype
    #[arg(long, global = true)]
    with_doctype: Option<String>,

    /// Whether soft-deleted documents are matched
    #[arg(long, global = true, value_enum, default_value = "no")]
    with_deleted_docs: DeletedDocs,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Print everything known about the matched records or documents
    GetInfo,

    /// Print disk usage of the matched documents
    GetDiskUsage,

    /// Print the history of the matched documents
    GetHistory,

    /// Change the doctype of the matched documents
    SetDoctype { doctype: String },

    /// Set (or with an empty string remove) the description of the latest files
    SetDescription {
        description: String,
        /// Only touch this format
        #[arg(long)]
        with_format: Option<String>,
    },

    /// Set (or with an empty string remove) the comment of the latest files
    SetComment {
        comment: String,
        /// Only touch this format
        #[arg(long)]
        with_format: Option<String>,
    },

    /// Set (or with an empty string remove) the restriction of the matched documents
    SetRestriction { restriction: String },

    /// Rename the single matched document
    SetDocname { docname: String },

    /// Hide files of the matched documents
    Hide {
        /// Versions to hide, e.g. 1-2,4 or ALL
        #[arg(long)]
        with_version: Option<String>,
        #[arg(long)]
        with_format: Option<String>,
    },

    /// Unhide files of the matched documents
    Unhide {
        /// Versions to unhide, e.g. 1-2,4 or ALL
        #[arg(long)]
        with_version: Option<String>,
        #[arg(long)]
        with_format: Option<String>,
    },

    /// Add a file as a new format of a document of the single matched record
    Append {
        path: PathBuf,
        /// Document name (defaults to the file name without extension)
        #[arg(long)]
        docname: Option<String>,
        #[arg(long, default_value = "Main")]
        doctype: String,
        #[arg(long)]
        with_format: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        restriction: Option<String>,
        /// Comma-separated flags, e.g. PDF/A,OCRED
        #[arg(long)]
        with_flags: Option<String>,
    },

    /// Add a file as a new version of a document of the single matched record
    Revise {
        path: PathBuf,
        /// Document name (defaults to the file name without extension)
        #[arg(long)]
        docname: Option<String>,
        /// Rename the document before revising it
        #[arg(long)]
        new_docname: Option<String>,
        #[arg(long)]
        with_format: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        restriction: Option<String>,
        /// Hide every previous version
        #[arg(long)]
        with_hide_previous: bool,
        /// Comma-separated flags, e.g. PDF/A,OCRED
        #[arg(long)]
        with_flags: Option<String>,
    },

    /// Copy a previous version of the single matched document to a new version
    Revert {
        #[arg(long)]
        with_version: i64,
    },

    /// Soft-delete the matched documents
    Delete,

    /// Remove one format at one version of the single matched document (irreversible)
    HardDelete {
        #[arg(long)]
        with_format: String,
        #[arg(long)]
        with_version: i64,
    },

    /// Restore soft-deleted documents
    Undelete {
        /// Status given back to the restored documents
        #[arg(long, default_value = "")]
        restriction: String,
    },

    /// Remove every version but the latest of the matched documents
    Purge,

    /// Remove the matched documents with every file and row (irreversible)
    Expunge {
        /// Confirm the irreversible removal
        #[arg(long)]
        yes_i_know: bool,
    },

    /// Verify the stored checksums of the matched documents
    CheckMd5,

    /// Recompute the stored checksums of the matched documents
    UpdateMd5,

    /// Report documents whose names or files break the naming conventions
    CheckFormat,

    /// Report records with several documents of the same name
    CheckDuplicateDocnames,

    /// Regroup the files of every document of the matched records
    FixAll,

    /// Rename documents and files to the naming conventions
    FixFormat,

    /// Merge documents sharing a name within a record
    FixDuplicateDocnames,

    /// Rebuild the fsinfo cache of every document from disk
    FixBibdocfsinfoCache,

    /// Start the file server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default from config)
        bind: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, _config) = load_settings(cli.config.as_deref()).await;

    let store = DocStore::from_settings(&settings)?;
    let selection = Selection {
        recids: cli.recids,
        docids: cli.docids,
        all: cli.all,
        docname: cli.with_docname,
        doctype: cli.with_doctype,
        deleted: cli.with_deleted_docs,
    };

    match cli.command {
        Commands::GetInfo => info::cmd_get_info(&store, &selection),
        Commands::GetDiskUsage => info::cmd_get_disk_usage(&store, &selection),
        Commands::GetHistory => info::cmd_get_history(&store, &selection),
        Commands::SetDoctype { doctype } => setters::cmd_set_doctype(&store, &selection, &doctype),
        Commands::SetDescription {
            description,
            with_format,
        } => setters::cmd_set_description(&store, &selection, &description, with_format.as_deref()),
        Commands::SetComment { comment, with_format } => {
            setters::cmd_set_comment(&store, &selection, &comment, with_format.as_deref())
        }
        Commands::SetRestriction { restriction } => {
            setters::cmd_set_restriction(&store, &selection, &restriction)
        }
        Commands::SetDocname { docname } => setters::cmd_set_docname(&store, &selection, &docname),
        Commands::Hide {
            with_version,
            with_format,
        } => setters::cmd_hide(
            &store,
            &selection,
            with_version.as_deref(),
            with_format.as_deref(),
            true,
        ),
        Commands::Unhide {
            with_version,
            with_format,
        } => setters::cmd_hide(
            &store,
            &selection,
            with_version.as_deref(),
            with_format.as_deref(),
            false,
        ),
        Commands::Append {
            path,
            docname,
            doctype,
            with_format,
            description,
            comment,
            restriction,
            with_flags,
        } => revisions::cmd_append(
            &store,
            &selection,
            &path,
            revisions::RevisionArgs {
                docname,
                doctype: Some(doctype),
                format: with_format,
                description,
                comment,
                restriction,
                flags: with_flags,
                ..Default::default()
            },
        ),
        Commands::Revise {
            path,
            docname,
            new_docname,
            with_format,
            description,
            comment,
            restriction,
            with_hide_previous,
            with_flags,
        } => revisions::cmd_revise(
            &store,
            &selection,
            &path,
            revisions::RevisionArgs {
                docname,
                new_docname,
                doctype: None,
                format: with_format,
                description,
                comment,
                restriction,
                flags: with_flags,
                hide_previous: with_hide_previous,
            },
        ),
        Commands::Revert { with_version } => revisions::cmd_revert(&store, &selection, with_version),
        Commands::Delete => revisions::cmd_delete(&store, &selection),
        Commands::HardDelete {
            with_format,
            with_version,
        } => revisions::cmd_hard_delete(&store, &selection, &with_format, with_version),
        Commands::Undelete { restriction } => {
            let selection = Selection {
                deleted: DeletedDocs::Only,
                ..selection
            };
            revisions::cmd_undelete(&store, &selection, &restriction)
        }
        Commands::Purge => revisions::cmd_purge(&store, &selection),
        Commands::Expunge { yes_i_know } => revisions::cmd_expunge(&store, &selection, yes_i_know),
        Commands::CheckMd5 => maintenance::cmd_check_md5(&store, &selection),
        Commands::UpdateMd5 => maintenance::cmd_update_md5(&store, &selection),
        Commands::CheckFormat => maintenance::cmd_check_format(&store, &selection),
        Commands::CheckDuplicateDocnames => maintenance::cmd_check_duplicate_docnames(&store, &selection),
        Commands::FixAll => maintenance::cmd_fix_all(&store, &selection),
        Commands::FixFormat => maintenance::cmd_fix_format(&store, &selection),
        Commands::FixDuplicateDocnames => maintenance::cmd_fix_duplicate_docnames(&store, &selection),
        Commands::FixBibdocfsinfoCache => maintenance::cmd_fix_bibdocfsinfo_cache(&store),
        Commands::Serve { bind } => serve::cmd_serve(&settings, bind.as_deref()).await,
    }
}
