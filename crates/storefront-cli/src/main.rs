use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use storefront_core::auth::{AuthService, Credentials};
use storefront_core::services::products::ProductService;
use storefront_core::store::{FileSecureStore, SessionStatus};
use storefront_core::{ApiClient, ClientConfig, HttpClient, SessionStore};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Storefront terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Account and session commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Catalogue operations
    #[command(subcommand)]
    Products(ProductCommand),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Sign in and store the session
    Login(CredentialArgs),
    /// Create an account and store the session
    Register(CredentialArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Me(OutputArgs),
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    /// List products
    List(OutputArgs),
    /// Delete a product by id
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[arg(long)]
    id: String,
}

struct App {
    session: Arc<SessionStore>,
    http: HttpClient,
}

impl App {
    async fn start() -> Result<Self> {
        let config = ClientConfig::from_env().context("invalid client configuration")?;
        debug!(base_url = %config.base_url, "starting storefront client");
        let client = ApiClient::new(config).context("failed to build API client")?;
        let storage = FileSecureStore::with_default_locator()
            .context("unable to initialise secure store")?;

        let session = SessionStore::new(Arc::new(storage), client.clone());
        session.attach();
        if let Err(err) = session.hydrate().await {
            warn!(error = %err, "stored session could not be read; continuing as guest");
        }

        Ok(Self {
            session,
            http: HttpClient::new(client),
        })
    }

    fn require_session(&self) -> Result<()> {
        if self.session.status() != SessionStatus::Authenticated {
            bail!("not signed in; run `storefront auth login`");
        }
        Ok(())
    }

    fn auth(&self) -> AuthService {
        AuthService::new(self.http.clone())
    }

    fn products(&self) -> ProductService {
        ProductService::new(self.http.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app = App::start().await?;
    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(&app, args).await?,
            AuthCommand::Register(args) => auth_register(&app, args).await?,
            AuthCommand::Logout => auth_logout(&app).await?,
            AuthCommand::Me(args) => auth_me(&app, args).await?,
        },
        Commands::Products(cmd) => match cmd {
            ProductCommand::List(args) => products_list(&app, args).await?,
            ProductCommand::Delete(args) => products_delete(&app, args).await?,
        },
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn auth_login(app: &App, args: CredentialArgs) -> Result<()> {
    let credentials = Credentials::new(args.email, args.password);
    let session = app.auth().login(&credentials).await.context("login failed")?;
    let email = session.user.email.clone();
    app.session
        .set_session(session)
        .await
        .context("failed to store session")?;
    println!("Logged in as {email}");
    Ok(())
}

async fn auth_register(app: &App, args: CredentialArgs) -> Result<()> {
    let credentials = Credentials::new(args.email, args.password);
    let session = app
        .auth()
        .register(&credentials)
        .await
        .context("registration failed")?;
    let email = session.user.email.clone();
    app.session
        .set_session(session)
        .await
        .context("failed to store session")?;
    println!("Account created for {email}");
    Ok(())
}

async fn auth_logout(app: &App) -> Result<()> {
    if app.session.is_authenticated() {
        if let Err(err) = app.auth().logout().await {
            eprintln!("Server logout failed ({err}); clearing local session anyway.");
        }
    }
    app.session
        .sign_out()
        .await
        .context("failed to remove stored session")?;
    println!("Signed out.");
    Ok(())
}

async fn auth_me(app: &App, args: OutputArgs) -> Result<()> {
    app.require_session()?;
    let me = app.auth().me().await.context("request failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&me.user)?);
    } else {
        println!("User ID : {}", me.user.id);
        println!("Email   : {}", me.user.email);
    }
    Ok(())
}

async fn products_list(app: &App, args: OutputArgs) -> Result<()> {
    app.require_session()?;
    let items: Vec<Value> = app
        .products()
        .list()
        .await
        .context("failed to list products")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No products.");
        return Ok(());
    }
    println!("{:<24} {}", "ID", "NAME");
    println!("{}", "-".repeat(60));
    for item in &items {
        println!("{:<24} {}", field(item, "id"), field(item, "name"));
    }
    Ok(())
}

async fn products_delete(app: &App, args: DeleteArgs) -> Result<()> {
    app.require_session()?;
    app.products()
        .delete(&args.id)
        .await
        .with_context(|| format!("failed to delete product {}", args.id))?;
    println!("Deleted product {}", args.id);
    Ok(())
}

fn field(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "-".to_owned(),
        Some(other) => other.to_string(),
    }
}
