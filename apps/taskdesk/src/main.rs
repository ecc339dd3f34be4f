use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AppContext, ClientOptions, FileBlob, FormState, FormStateStore, Navigation, Resource,
    TaskRepository,
};
use shared::{
    domain::TaskId,
    protocol::{Task, UpdateUserSettingsFields},
};
use tracing::info;

mod auth_file;
mod config;

use auth_file::{load_auth, remove_auth, save_auth};
use config::{load_settings, normalize_server_url};

#[derive(Parser, Debug)]
#[command(name = "taskdesk", about = "Command-line client for the task backend")]
struct Args {
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    auth_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email (or username) and password.
    Login {
        #[arg(long)]
        identity: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Resolve an in-app path and print the screen it leads to.
    Navigate { path: String },
    Tasks {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Avatar {
        #[command(subcommand)]
        command: AvatarCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    List,
    Show {
        id: String,
    },
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        color: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum AvatarCommand {
    /// Upload an image file as the profile picture.
    Set { file: PathBuf },
    /// Remove the current profile picture.
    Remove,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(auth_file) = args.auth_file {
        settings.auth_file = auth_file;
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let mut options = ClientOptions::new(normalize_server_url(&settings.server_url)?);
    options.request_timeout = Duration::from_secs(settings.request_timeout_secs);
    options.redirect_limit = settings.redirect_limit;
    let auth = Arc::new(load_auth(&settings.auth_file)?);
    let app = AppContext::new(&options, auth)?;

    match args.command {
        Command::Login { identity, password } => {
            let user = app.login(&identity, &password).await?;
            save_auth(&settings.auth_file, app.auth())?;
            let status = if user.verified {
                "verified"
            } else {
                "email not verified"
            };
            println!("Signed in as {} ({status})", user.email);
        }
        Command::Logout => {
            app.logout();
            remove_auth(&settings.auth_file)?;
            println!("Signed out");
        }
        Command::Navigate { path } => {
            let navigation = app.navigate(&path).await;
            print_navigation(&navigation);
            if let Some(theme) = app.theme() {
                println!("theme: {theme}");
            }
            if let Navigation::Errored(error) = navigation {
                bail!("navigation to {} failed: {}", error.location, error.message);
            }
        }
        Command::Tasks { command } => run_tasks(&app, command).await?,
        Command::Avatar { command } => {
            run_avatar(&app, command).await?;
            save_auth(&settings.auth_file, app.auth())?;
        }
    }

    Ok(())
}

fn print_navigation(navigation: &Navigation) {
    match navigation {
        Navigation::Rendered(rendered) => {
            for from in &rendered.redirected_from {
                println!("redirected from {from}");
            }
            println!("{} -> {:?}", rendered.location.href(), rendered.screen());
            for resource in &rendered.resources {
                println!("  {}", describe(resource));
            }
        }
        Navigation::Errored(error) => {
            for from in &error.redirected_from {
                println!("redirected from {from}");
            }
            println!("{} -> error: {}", error.location, error.message);
        }
        Navigation::Superseded => println!("navigation superseded"),
    }
}

fn describe(resource: &Resource) -> String {
    match resource {
        Resource::CurrentUser(current) => format!(
            "user {} (theme {})",
            current.user.email,
            current.theme().unwrap_or_default()
        ),
        Resource::Tasks(tasks) => format!("{} task(s)", tasks.len()),
        Resource::Task(record) => format!("task {}: {}", record.id, record.task.title),
    }
}

async fn run_tasks(app: &AppContext, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List => {
            let tasks = app.tasks().list().await?;
            if tasks.is_empty() {
                println!("No tasks yet");
            }
            for record in tasks {
                println!(
                    "{}  {}  ({} day(s) done)",
                    record.id,
                    record.task.title,
                    record.task.history.len()
                );
            }
        }
        TaskCommand::Show { id } => {
            let task_id = TaskId::parse(&id)?;
            let record = app.tasks().get_by_id(&task_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        TaskCommand::Create {
            title,
            description,
            color,
        } => {
            let task = Task {
                title,
                description,
                color,
                history: Vec::new(),
            };
            let record = app.create_task(&task).await?;
            println!("Created task {}", record.id);
        }
        TaskCommand::Delete { id } => {
            let task_id = TaskId::parse(&id)?;
            app.delete_task(&task_id).await?;
            println!("Deleted task {task_id}");
        }
    }
    Ok(())
}

async fn run_avatar(app: &AppContext, command: AvatarCommand) -> Result<()> {
    let form = Arc::new(FormState::new());
    let mut field = app.avatar_field(form.clone());

    match command {
        AvatarCommand::Set { file } => {
            let blob = FileBlob::from_path(&file)
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            field.select_file(blob)?;
        }
        AvatarCommand::Remove => {
            if !field.can_delete() {
                println!("No avatar to remove");
                return Ok(());
            }
            field.clear_file();
        }
    }
    info!(field = field.label(), value = %field.display_value(), "avatar staged");

    let fields = match app.settings_api().get_settings(None).await {
        Ok(current) => UpdateUserSettingsFields {
            remind_email: current.remind_email,
            remind_by_email_enabled: current.remind_by_email_enabled,
            theme: current.theme,
            ..UpdateUserSettingsFields::default()
        },
        Err(error) if error.is_not_found() => UpdateUserSettingsFields::default(),
        Err(error) => return Err(error.into()),
    };
    let user = app
        .update_user_settings(&fields, &form.value(field.name()))
        .await?;

    match user.avatar() {
        Some(name) => println!("Avatar set to {name}"),
        None => println!("Avatar removed"),
    }
    Ok(())
}
