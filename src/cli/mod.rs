//! Command-line interface for taskdeck.
//!
//! The CLI is the presentation consumer of the synchronization layer:
//! reads go through the query cache, mutations go through the resource
//! clients and commit their invalidation sets back to the cache.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::QueryKey;
use crate::config::Config;
use crate::models::{
    CreateProject, CreateSubtask, CreateTodo, LoginCredentials, Priority, Project,
    RegisterCredentials, Todo, UpdateProject, UpdateTodo,
};
use crate::transport::{Navigator, Surface};
use crate::ClientContext;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "taskdeck")]
#[command(author, version, about = "A synchronized client for a task/project API", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "taskdeck.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to (overrides the config file)
    #[arg(long, env = "TASKDECK_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and persist the session
    Login {
        email: String,
        password: String,
    },

    /// Create an account and sign in
    Register {
        name: String,
        email: String,
        password: String,
        /// Repeat the password to confirm it
        #[arg(long)]
        confirm: String,
    },

    /// Discard the persisted session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Project management commands
    #[command(subcommand)]
    Projects(ProjectsCommands),

    /// Todo management commands
    #[command(subcommand)]
    Todos(TodosCommands),

    /// Subtask management commands
    #[command(subcommand)]
    Subtasks(SubtasksCommands),
}

#[derive(Subcommand, Debug)]
pub enum ProjectsCommands {
    /// List all projects
    List,
    /// Show one project with its todos
    Show { id: String },
    /// Create a project
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Update project fields
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a project (its todos are removed server-side)
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TodosCommands {
    /// List todos, optionally scoped to a project
    List {
        #[arg(long)]
        project: Option<String>,
    },
    /// Show one todo with its subtasks
    Show { id: String },
    /// Create a todo
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date, RFC 3339 (e.g. 2026-09-01T00:00:00Z)
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Mark a todo completed (idempotent)
    Complete { id: String },
    /// Update todo fields
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Delete a todo
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum SubtasksCommands {
    /// Add a subtask to a todo
    Add { todo: String, title: String },
    /// Mark a subtask completed (idempotent)
    Complete {
        id: String,
        /// Parent todo id
        #[arg(long)]
        todo: String,
    },
    /// Delete a subtask
    Delete {
        id: String,
        /// Parent todo id
        #[arg(long)]
        todo: String,
    },
}

/// Navigator for the CLI. One-shot commands have no login page to
/// redirect to; a session teardown is reported on stderr instead.
struct CliNavigator {
    surface: Surface,
}

impl Navigator for CliNavigator {
    fn current_surface(&self) -> Surface {
        self.surface
    }

    fn go_to_login(&self) {
        eprintln!("Session expired. Run `taskdeck login` to sign in again.");
    }
}

fn parse_due(due: Option<String>) -> Result<Option<DateTime<Utc>>> {
    due.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("Invalid due date: {s}"))
    })
    .transpose()
}

fn parse_priority(priority: Option<String>) -> Result<Option<Priority>> {
    priority
        .map(|s| match s.as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => bail!("Invalid priority: {other} (expected low, medium or high)"),
        })
        .transpose()
}

fn print_project(project: &Project) {
    let color = project.color.as_deref().unwrap_or("-");
    println!("{}  {}  {}", project.id, project.name, color);
    if let Some(description) = &project.description {
        println!("    {description}");
    }
    if let Some(progress) = project.progress() {
        println!("    progress: {progress}%");
    }
}

fn print_todo(todo: &Todo) {
    let mark = if todo.completed { "x" } else { " " };
    println!("[{mark}] {}  {}", todo.id, todo.title);
    if let Some(due) = &todo.due_date {
        println!("      due {due}");
    }
    if let Some(subtasks) = &todo.subtasks {
        for subtask in subtasks {
            let mark = if subtask.completed { "x" } else { " " };
            println!("      [{mark}] {}  {}", subtask.id, subtask.title);
        }
    }
}

/// Run one CLI command against a freshly constructed client context.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)?;
    if let Some(api_url) = cli.api_url {
        config.api.base_url = api_url;
    }

    let surface = match &cli.command {
        Commands::Login { .. } | Commands::Register { .. } => Surface::Login,
        _ => Surface::Other,
    };
    let ctx = ClientContext::with_navigator(config, Arc::new(CliNavigator { surface }));

    match cli.command {
        Commands::Login { email, password } => {
            let user = ctx.login(LoginCredentials { email, password }).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Commands::Register {
            name,
            email,
            password,
            confirm,
        } => {
            let user = ctx
                .register(RegisterCredentials {
                    name,
                    email,
                    password,
                    confirm_password: confirm,
                })
                .await?;
            println!("Account created. Signed in as {} <{}>", user.name, user.email);
        }
        Commands::Logout => {
            ctx.logout();
            println!("Signed out");
        }
        Commands::Whoami => match ctx.session.current() {
            Some(session) => {
                println!("{} <{}>", session.user.name, session.user.email);
                println!("session expires {}", session.expires_at);
            }
            None => println!("Not signed in"),
        },
        Commands::Projects(command) => run_projects(&ctx, command).await?,
        Commands::Todos(command) => run_todos(&ctx, command).await?,
        Commands::Subtasks(command) => run_subtasks(&ctx, command).await?,
    }
    Ok(())
}

async fn run_projects(ctx: &ClientContext, command: ProjectsCommands) -> Result<()> {
    match command {
        ProjectsCommands::List => {
            let snapshot = ctx.cache.query(&QueryKey::Projects).await;
            if let Some(error) = snapshot.error {
                return Err(error.into());
            }
            let projects = snapshot.data.map(|d| d.into_projects()).unwrap_or_default();
            for project in &projects {
                print_project(project);
            }
            if projects.is_empty() {
                println!("No projects");
            }
        }
        ProjectsCommands::Show { id } => {
            let snapshot = ctx.cache.query(&QueryKey::Project(id)).await;
            if let Some(error) = snapshot.error {
                return Err(error.into());
            }
            if let Some(project) = snapshot.data.and_then(|d| d.into_project()) {
                print_project(&project);
                for todo in project.todos.as_deref().unwrap_or_default() {
                    print_todo(todo);
                }
            }
        }
        ProjectsCommands::Create {
            name,
            description,
            color,
        } => {
            let data = CreateProject {
                name,
                description,
                color,
            };
            crate::validate::project(&data)?;
            let outcome = ctx.api.projects.create(data).await?;
            let project = ctx.commit(outcome);
            println!("Created project {}", project.id);
        }
        ProjectsCommands::Update {
            id,
            name,
            description,
            color,
        } => {
            let patch = UpdateProject {
                name,
                description,
                color,
            };
            let outcome = ctx.api.projects.update(&id, patch).await?;
            let project = ctx.commit(outcome);
            println!("Updated project {}", project.id);
        }
        ProjectsCommands::Delete { id } => {
            let outcome = ctx.api.projects.delete(&id).await?;
            ctx.commit(outcome);
            println!("Deleted project {id}");
        }
    }
    Ok(())
}

async fn run_todos(ctx: &ClientContext, command: TodosCommands) -> Result<()> {
    match command {
        TodosCommands::List { project } => {
            let key = match project {
                Some(project_id) => QueryKey::TodosByProject(project_id),
                None => QueryKey::Todos,
            };
            let snapshot = ctx.cache.query(&key).await;
            if let Some(error) = snapshot.error {
                return Err(error.into());
            }
            let todos = snapshot.data.map(|d| d.into_todos()).unwrap_or_default();
            for todo in &todos {
                print_todo(todo);
            }
            if todos.is_empty() {
                println!("No todos");
            }
        }
        TodosCommands::Show { id } => {
            let snapshot = ctx.cache.query(&QueryKey::Todo(id)).await;
            if let Some(error) = snapshot.error {
                return Err(error.into());
            }
            if let Some(todo) = snapshot.data.and_then(|d| d.into_todo()) {
                print_todo(&todo);
                if let Some(note) = &todo.note {
                    println!("      note: {note}");
                }
            }
        }
        TodosCommands::Create {
            title,
            description,
            due,
            note,
            priority,
            project,
        } => {
            let data = CreateTodo {
                title,
                description,
                due_date: parse_due(due)?,
                note,
                priority: parse_priority(priority)?,
                project_id: project,
            };
            crate::validate::todo(&data)?;
            let outcome = ctx.api.todos.create(data).await?;
            let todo = ctx.commit(outcome);
            println!("Created todo {}", todo.id);
        }
        TodosCommands::Complete { id } => {
            let outcome = ctx.api.todos.complete(&id, None).await?;
            let todo = ctx.commit(outcome);
            println!("Completed todo {}", todo.id);
        }
        TodosCommands::Update {
            id,
            title,
            description,
            due,
            note,
            priority,
        } => {
            let patch = UpdateTodo {
                title,
                description,
                due_date: parse_due(due)?,
                note,
                priority: parse_priority(priority)?,
                project_id: None,
            };
            let outcome = ctx.api.todos.update(&id, patch).await?;
            let todo = ctx.commit(outcome);
            println!("Updated todo {}", todo.id);
        }
        TodosCommands::Delete { id } => {
            let outcome = ctx.api.todos.delete(&id).await?;
            ctx.commit(outcome);
            println!("Deleted todo {id}");
        }
    }
    Ok(())
}

async fn run_subtasks(ctx: &ClientContext, command: SubtasksCommands) -> Result<()> {
    match command {
        SubtasksCommands::Add { todo, title } => {
            let data = CreateSubtask { title };
            crate::validate::subtask(&data)?;
            let outcome = ctx.api.subtasks.create(&todo, data).await?;
            let subtask = ctx.commit(outcome);
            println!("Created subtask {}", subtask.id);
        }
        SubtasksCommands::Complete { id, todo } => {
            let outcome = ctx.api.subtasks.complete(&id, &todo).await?;
            let subtask = ctx.commit(outcome);
            println!("Completed subtask {}", subtask.id);
        }
        SubtasksCommands::Delete { id, todo } => {
            let outcome = ctx.api.subtasks.delete(&id, &todo).await?;
            ctx.commit(outcome);
            println!("Deleted subtask {id}");
        }
    }
    Ok(())
}
