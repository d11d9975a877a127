use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use powchain_core::{AmountResponse, Wallet};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain-cli")]
#[command(about = "CLI client for a powchain node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:5001")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key pair and print it with its address
    Wallet,
    /// Sign and submit a transfer
    Send {
        /// Sender's private key (hex)
        #[arg(long, env = "POWCHAIN_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Recipient address
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
    },
    /// Confirmed balance of an address
    Balance { address: String },
    /// Print the node's chain
    Chain,
    /// Print the node's pending transactions
    Pool,
    /// Mine one block now, or start the node's mining loop
    Mine {
        #[arg(long)]
        start: bool,
    },
}

#[derive(Serialize)]
struct WalletOut {
    private_key: String,
    public_key: String,
    blockchain_address: String,
}

impl From<&Wallet> for WalletOut {
    fn from(wallet: &Wallet) -> Self {
        Self {
            private_key: wallet.private_key_hex(),
            public_key: wallet.public_key_hex(),
            blockchain_address: wallet.address().to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();
    match cli.cmd {
        Command::Wallet => {
            let wallet = Wallet::generate();
            println!("{}", serde_json::to_string_pretty(&WalletOut::from(&wallet))?);
        }
        Command::Send {
            private_key,
            to,
            amount,
        } => {
            let wallet = Wallet::from_private_key_hex(&private_key)
                .context("could not load private key")?;
            let request = wallet.transfer(to, amount)?;
            debug!(from = wallet.address(), "submitting transaction");
            let res = client
                .post(format!("{node}/transactions"))
                .json(&request)
                .send()
                .await?;
            print_response(res).await?;
        }
        Command::Balance { address } => {
            let res = client
                .get(format!("{node}/amount"))
                .query(&[("blockchain_address", &address)])
                .send()
                .await?
                .error_for_status()?;
            let body: AmountResponse = res.json().await?;
            println!("{address}: {}", body.amount);
        }
        Command::Chain => {
            print_response(client.get(format!("{node}/chain")).send().await?).await?;
        }
        Command::Pool => {
            print_response(client.get(format!("{node}/transactions")).send().await?).await?;
        }
        Command::Mine { start } => {
            let path = if start { "mine/start" } else { "mine" };
            print_response(client.get(format!("{node}/{path}")).send().await?).await?;
        }
    }
    Ok(())
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body: Value = res.json().await.context("node sent a non-JSON body")?;
    println!("status: {status}");
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
