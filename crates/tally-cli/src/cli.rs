use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track your money from the command line, offline first")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage wallets
    #[command(subcommand)]
    Wallet(WalletCommand),
    /// Manage spending channels
    #[command(subcommand)]
    Channel(ChannelCommand),
    /// Record and inspect transactions
    #[command(subcommand)]
    Tx(TxCommand),
    /// Track money owed to or by you
    #[command(subcommand)]
    Commit(CommitCommand),
    /// Plan purchases and book them in one step
    #[command(subcommand)]
    Plan(PlanCommand),
    /// Push local changes and pull remote ones
    Sync {
        /// Administrative: pull every tenant's records, ignoring the cursor
        #[arg(long, conflicts_with = "global")]
        force_pull: bool,
        /// Administrative: refresh the shared configuration cache instead
        #[arg(long)]
        global: bool,
    },
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Run a sync cycle and print status transitions as they happen
        #[arg(long)]
        watch: bool,
    },
    /// Manage the CLI profile
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommand {
    /// Create a new wallet
    #[command(alias = "new")]
    Add {
        /// Wallet name
        name: String,
        /// ISO currency code, e.g. PHP or USD
        currency: String,
        /// Starting balance, e.g. 1500.00
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        opening_balance: String,
    },
    /// List wallets with their balances
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a wallet
    Rename {
        /// Wallet id, id prefix, or name
        wallet: String,
        /// New wallet name
        name: String,
    },
    /// Delete a wallet
    Delete {
        /// Wallet id, id prefix, or name
        wallet: String,
    },
}

#[derive(Subcommand)]
pub enum ChannelCommand {
    /// Create a new channel
    #[command(alias = "new")]
    Add {
        /// Channel name, e.g. "GCash"
        name: String,
        /// Channel kind, e.g. cash, bank, ewallet
        kind: String,
    },
    /// List channels
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a channel
    Delete {
        /// Channel id, id prefix, or name
        channel: String,
    },
}

#[derive(Subcommand)]
pub enum TxCommand {
    /// Record a transaction (negative amount = expense)
    #[command(alias = "new")]
    Add {
        /// Wallet id, id prefix, or name
        wallet: String,
        /// Signed amount, e.g. -120.50 for an expense
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Channel id, id prefix, or name
        #[arg(long)]
        channel: Option<String>,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
    },
    /// List recent transactions
    List {
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show transactions for this wallet
        #[arg(long)]
        wallet: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a transaction
    Delete {
        /// Transaction id or unique id prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CommitCommand {
    /// Record money owed to you or by you
    #[command(alias = "new")]
    Add {
        /// Who the commitment is with
        counterparty: String,
        /// Amount, e.g. 500.00
        amount: String,
        /// Whether they owe you or you owe them
        #[arg(long, value_enum, default_value_t = DirectionArg::Owed)]
        direction: DirectionArg,
        /// Optional due date, YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
    },
    /// Mark a commitment as settled
    Settle {
        /// Commitment id or unique id prefix
        id: String,
    },
    /// List commitments
    List {
        /// Include settled commitments
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum PlanCommand {
    /// Create a draft plan
    #[command(alias = "new")]
    Add {
        /// Plan title
        title: String,
        /// Wallet the plan will draw from (id, id prefix, or name)
        #[arg(long)]
        wallet: String,
    },
    /// Add a component to a draft plan
    Component {
        /// Plan id or unique id prefix
        plan: String,
        /// Component label
        label: String,
        /// Component amount, e.g. 350.00
        amount: String,
    },
    /// Book every component as a transaction and lock the plan
    Finalize {
        /// Plan id or unique id prefix
        plan: String,
    },
    /// Record a payment against a finalized plan
    Settle {
        /// Plan id or unique id prefix
        plan: String,
        /// Who paid
        payer: String,
        /// Amount paid, e.g. 200.00
        amount: String,
    },
    /// List plans
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Create or update the profile file
    Init {
        /// Sync backend base URL
        #[arg(long, value_name = "URL")]
        backend_url: Option<String>,
        /// Tenant identifier used to scope sync
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Bearer token sent with every backend request
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Default database path for this profile
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
    },
    /// Print the resolved profile
    Show,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Owed,
    Owing,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}
