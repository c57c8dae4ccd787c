use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use facturation::{
  application::invoice::{IssueInvoiceCommand, IssueInvoiceUseCase, SessionRegistry},
  infrastructure::{bootstrap, config::Config},
};

/// Session key of command-line submissions
const CLI_SESSION: &str = "cli";

#[derive(Parser, Debug)]
#[command(
  author,
  version,
  name = "facturation-cli",
  about = "Issue an invoice from the catalog spreadsheet: PDF, Drive upload, email and ledger",
  args_conflicts_with_subcommands = true,
  subcommand_negates_reqs = true
)]
struct Args {
  #[command(subcommand)]
  command: Option<Command>,

  /// Client identifier from the clients tab
  #[arg(long, value_name = "ID", required = true)]
  client_id: Option<String>,

  /// Product identifier from the products tab
  #[arg(long, value_name = "ID", required = true)]
  product_id: Option<String>,

  /// Quantity (1 to 100)
  #[arg(long, default_value_t = 1)]
  qty: u32,

  /// Free text printed on the invoice
  #[arg(long)]
  notes: Option<String>,

  /// Net amount per unit, for variable-amount products
  #[arg(long, value_name = "NET")]
  amount: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Grant access to Google Sheets, Drive and Gmail
  Authorize,
}

#[tokio::main]
async fn main() -> ExitCode {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "facturation=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  // Usage errors exit with status 1 like every other failure
  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      return if e.use_stderr() {
        ExitCode::FAILURE
      } else {
        ExitCode::SUCCESS
      };
    }
  };
  let outcome = match args.command {
    Some(Command::Authorize) => authorize().await,
    None => issue(args).await,
  };

  match outcome {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("Erreur : {:#}", e);
      ExitCode::FAILURE
    }
  }
}

async fn authorize() -> Result<()> {
  let config = Config::load().context("Failed to load configuration")?;
  let credentials = bootstrap::google_credentials(&config).await?;

  let (auth_url, _state) = credentials.oauth().get_authorization_url();
  println!("Ouvrez cette adresse dans un navigateur et autorisez l'accès :\n\n{}\n", auth_url);
  println!("Collez ensuite le code d'autorisation :");

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let code = lines
    .next_line()
    .await
    .context("Failed to read the authorization code")?
    .map(|line| line.trim().to_string())
    .filter(|code| !code.is_empty())
    .context("No authorization code entered")?;

  credentials.authorize_with_code(code).await?;
  println!("Autorisation enregistrée.");
  Ok(())
}

async fn issue(args: Args) -> Result<()> {
  let (Some(client_id), Some(product_id)) = (args.client_id, args.product_id) else {
    bail!("--client-id and --product-id are required");
  };

  let config = Config::load().context("Failed to load configuration")?;
  config.validate()?;

  let credentials = bootstrap::google_credentials(&config).await?;
  let invoice_service = bootstrap::invoice_service(&config, credentials, false)?;
  let use_case = IssueInvoiceUseCase::new(invoice_service, Arc::new(SessionRegistry::new()));

  let response = use_case
    .execute(IssueInvoiceCommand {
      session_id: CLI_SESSION.to_string(),
      client_id,
      product_id,
      quantity: args.qty,
      notes: args.notes,
      manual_amount: args.amount,
      issue_date: None,
    })
    .await?;

  println!("Facture {} du {}", response.invoice_number, response.issue_date);
  for step in &response.steps {
    let marker = match step.status.as_str() {
      "completed" => "✓",
      "skipped" => "-",
      _ => "✗",
    };
    if step.detail.is_empty() {
      println!("  {} {}", marker, step.label);
    } else {
      println!("  {} {} : {}", marker, step.label, step.detail);
    }
  }
  println!(
    "Total HT {} | TVA {} | Total TTC {}",
    response.net, response.tax, response.gross
  );

  if !response.success {
    bail!("invoice {} was not fully processed", response.invoice_number);
  }
  Ok(())
}
