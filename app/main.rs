use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use lib::{
    branches::MAIN,
    config::Config,
    package::{build_archive, extract_archive},
    versioned::{Outcome, VersionedWorkspace},
};

#[derive(Parser, Debug)]
struct Arguments {
    #[arg(short, long, default_value = ".", help = "working directory to version")]
    dir: PathBuf,
    #[arg(
        long,
        env = "REV_IDENTITY",
        default_value = "revtool",
        help = "who is working here; \"default\" runs without a store"
    )]
    identity: String,
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(about = "create the revision store if there is none")]
    Init,
    #[clap(about = "record all changes on the current branch")]
    Commit {
        #[arg(short, long, help = "message to leave with this revision")]
        message: String,
    },
    #[clap(about = "open the next alternate branch and switch to it")]
    Branch {
        #[arg(short, long, default_value = MAIN, help = "reference the branch starts from")]
        from: String,
        #[arg(short, long, default_value = "", help = "what the branch is for")]
        comment: String,
    },
    #[clap(about = "list branches, marking the current one")]
    Branches,
    #[clap(about = "show the revisions reachable from the current branch")]
    History,
    #[clap(about = "switch to another branch")]
    Checkout { branch: String },
    #[clap(about = "make main's content equal to a reference as one new revision")]
    Promote {
        source: String,
        #[arg(short, long, help = "message to leave with this revision")]
        message: String,
    },
    #[clap(about = "delete all history, keeping the working files")]
    Purge,
    #[clap(about = "zip (part of) the working directory")]
    Pack {
        #[arg(default_value = ".", help = "path below the working directory")]
        subpath: PathBuf,
        #[arg(short, long, help = "archive to write")]
        out: PathBuf,
    },
    #[clap(about = "unpack an archive, by default into the storage root")]
    Unpack {
        archive: PathBuf,
        #[arg(long, help = "destination directory")]
        dest: Option<PathBuf>,
    },
}

fn report<T: std::fmt::Display>(outcome: Outcome<T>) -> Result<(), Box<dyn Error>> {
    match outcome {
        Outcome::Done(value) => {
            println!("{}", value);
            Ok(())
        }
        Outcome::Anonymous => {
            log::info!("anonymous workspace, nothing recorded");
            Ok(())
        }
        Outcome::NotInitialized => Err("no revision store".into()),
        Outcome::Failed => Err("operation failed, see log".into()),
    }
}

fn run(args: Arguments) -> Result<(), Box<dyn Error>> {
    let config = Config::new(&args.dir)?;
    let identity = args.identity;
    let open = || VersionedWorkspace::new(&identity, config.local_dir.clone());
    use Command::*;
    match args.cmd {
        Init => {
            open()?;
        }
        Commit { message } => report(open()?.commit(&message))?,
        Branch { from, comment } => match open()?.branch_from(&from, &comment) {
            Outcome::Done(branched) => println!("{} {}", branched.branch, branched.revision),
            other => report(other)?,
        },
        Branches => {
            let workspace = open()?;
            let current = workspace.current_branch();
            for branch in workspace.branches() {
                let marker = if current.as_deref() == Some(branch.as_str()) { "*" } else { " " };
                println!("{} {}", marker, branch);
            }
        }
        History => {
            for entry in open()?.history() {
                println!("{}", entry);
            }
        }
        Checkout { branch } => open()?.checkout(&branch)?,
        Promote { source, message } => println!("{}", open()?.rewrite_to_main(&source, &message)?),
        Purge => open()?.purge()?,
        Pack { subpath, out } => fs::write(out, build_archive(&config.local_dir, &subpath)?)?,
        Unpack { archive, dest } => {
            let dest = dest.unwrap_or_else(|| config.storage_root.clone());
            extract_archive(&fs::read(archive)?, &dest)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run(Arguments::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
