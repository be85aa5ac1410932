use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::time::Duration;

use localsync::app::App;
use localsync::config::Config;
use localsync::editor::SaveOutcome;
use localsync::logging;
use localsync::similarity::{SimilarityGate, DEFAULT_THRESHOLD};

/// How long `fetch` waits for a stale entry's refresh before exiting
const REFRESH_WAIT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "localsync")]
#[command(about = "Local-first state, cache-aside loading and debounced sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/localsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Override the data directory
  #[arg(long)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Rehydrate and print store status
  Status,
  Notes {
    #[command(subcommand)]
    action: NotesCommand,
  },
  Tasks {
    #[command(subcommand)]
    action: TasksCommand,
  },
  /// Load a remote JSON resource cache-first
  Fetch {
    resource: String,
    /// Remote path, relative to remote.base_url (defaults to the resource name)
    #[arg(long)]
    path: Option<String>,
  },
  Doc {
    #[command(subcommand)]
    action: DocCommand,
  },
  /// Score two inputs and show the gate decision
  Similarity {
    a: String,
    b: String,
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
  },
  Cache {
    #[command(subcommand)]
    action: CacheCommand,
  },
  /// Remove the persisted state envelope
  Purge,
}

#[derive(Subcommand, Debug)]
enum NotesCommand {
  Add {
    title: String,
    #[arg(long, default_value = "")]
    body: String,
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  List,
  Rm {
    id: String,
  },
  /// Select a note, or clear the selection when no id is given
  Select {
    id: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum TasksCommand {
  Add { title: String },
  List,
  Done { id: String },
}

#[derive(Subcommand, Debug)]
enum DocCommand {
  /// Save a file's content as a document through the draft editor
  Save {
    file: PathBuf,
    /// Existing document id to update
    #[arg(long)]
    id: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Drop every cached remote resource
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  if let Command::Similarity { a, b, threshold } = &args.command {
    let gate = SimilarityGate::new(*threshold);
    println!("similarity: {:.3}", gate.score(a, b));
    println!("proceed:    {}", gate.should_proceed(a, b));
    return Ok(());
  }

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(data_dir) = args.data_dir {
    config.data_dir = data_dir;
  }
  let _log_guard = logging::init(&config.logging, &config.data_dir)?;

  let app = App::new(config)?;
  run(&app, args.command).await
}

async fn run(app: &App, command: Command) -> Result<()> {
  match command {
    Command::Status => {
      let status = app.status()?;
      println!("phase:     {}", status.phase.as_str());
      println!("user:      {}", status.user.as_deref().unwrap_or("(signed out)"));
      println!("persisted: {}", status.whitelist.join(", "));
      println!("restored:  {}", status.restored.join(", "));
      for (name, count) in status.counts {
        println!("  {:<14} {}", name, count);
      }
    }
    Command::Notes { action } => match action {
      NotesCommand::Add { title, body, tags } => {
        println!("{}", app.add_note(&title, &body, tags)?);
      }
      NotesCommand::List => {
        let (notes, selected) = app.notes()?;
        for note in notes {
          let marker = if selected.as_deref() == Some(note.id.as_str()) {
            "*"
          } else {
            " "
          };
          println!("{} {}  {}", marker, note.id, note.title);
        }
      }
      NotesCommand::Rm { id } => {
        if !app.remove_note(&id)? {
          return Err(eyre!("No note with id {}", id));
        }
      }
      NotesCommand::Select { id } => {
        app.select_note(id.as_deref())?;
      }
    },
    Command::Tasks { action } => match action {
      TasksCommand::Add { title } => println!("{}", app.add_task(&title)?),
      TasksCommand::List => {
        for task in app.tasks()? {
          let check = if task.done { "x" } else { " " };
          println!("[{}] {}  {}", check, task.id, task.title);
        }
      }
      TasksCommand::Done { id } => {
        if !app.complete_task(&id)? {
          return Err(eyre!("No task with id {}", id));
        }
      }
    },
    Command::Fetch { resource, path } => {
      let mut fetched = app.fetch(&resource, path.as_deref()).await?;
      let loaded = &fetched.loaded;
      eprintln!(
        "source: {} (fetched {})",
        loaded.source.as_str(),
        loaded.fetched_at.to_rfc3339()
      );
      println!("{}", serde_json::to_string_pretty(&loaded.data)?);

      // The refresh dies with the runtime unless it finishes first
      match fetched.settle(REFRESH_WAIT).await {
        Ok(Some(entry)) => eprintln!("refreshed: {}", entry.fetched_at.to_rfc3339()),
        Ok(None) => {}
        Err(e) => eprintln!("warning: cache not refreshed: {}", e),
      }
    }
    Command::Doc { action } => match action {
      DocCommand::Save { file, id } => {
        let content = std::fs::read_to_string(&file)
          .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
        let (editor, forwarder) = app.open_editor(id.as_deref())?;
        editor.edit(content);
        let outcome = editor.save_now().await;
        editor.teardown();
        drop(editor);
        forwarder
          .await
          .map_err(|e| eyre!("Draft recorder stopped: {}", e))?;

        match outcome {
          SaveOutcome::Saved(id) => println!("{}", id),
          SaveOutcome::Skipped => println!("unchanged"),
          SaveOutcome::Failed(message) => return Err(eyre!("Save failed: {}", message)),
        }
      }
    },
    Command::Cache { action } => match action {
      CacheCommand::Clear => println!("removed {} entries", app.clear_cache()?),
    },
    Command::Purge => {
      app.purge()?;
      println!("persisted state removed");
    }
    Command::Similarity { .. } => {}
  }
  Ok(())
}
