use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "angle")]
#[command(about = "Follow auctions, bid and manage listings from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name for API configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Follow live bids for an item, or the lobby
    Watch {
        /// Item ID to follow (the lobby when omitted)
        item: Option<String>,
        /// Items to follow through the lobby topic
        #[arg(long = "item", value_name = "ID", conflicts_with = "item")]
        lobby_items: Vec<String>,
        /// Print every state change as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Place a bid on an item
    Bid {
        /// Item ID
        item: String,
        /// Bid amount, e.g. 150 or 150.50
        amount: String,
        /// Place the bid through the RPC endpoint instead of the live channel
        #[arg(long)]
        http: bool,
    },
    /// Manage images of an item, avatar or store logo
    Images {
        #[command(subcommand)]
        command: ImageCommands,
    },
    /// Create and publish listings
    Listing {
        #[command(subcommand)]
        command: ListingCommands,
    },
    /// Wallet balance, deposits and withdrawals
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
    /// Order actions
    Orders {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Payment actions
    Payments {
        #[command(subcommand)]
        command: PaymentCommands,
    },
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

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// API base URL, e.g. <https://angle.example.com>
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Realtime socket URL (derived from the API base URL when omitted)
        #[arg(long, value_name = "URL")]
        socket_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ImageCommands {
    /// List confirmed images in display order
    List {
        /// Image owner: item:<id>, avatar:<user id> or logo:<user id>
        #[arg(long, value_name = "OWNER")]
        owner: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload image files
    Upload {
        /// Image owner: item:<id>, avatar:<user id> or logo:<user id>
        #[arg(long, value_name = "OWNER")]
        owner: String,
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove an image
    Remove {
        /// Image owner: item:<id>, avatar:<user id> or logo:<user id>
        #[arg(long, value_name = "OWNER")]
        owner: String,
        /// Image ID
        image: String,
    },
    /// Move an item image to a new position
    Reorder {
        /// Item ID
        #[arg(long, value_name = "ID")]
        item: String,
        /// Current position (0-based)
        from: usize,
        /// Target position (0-based)
        to: usize,
    },
}

#[derive(Subcommand)]
pub enum ListingCommands {
    /// Create a draft from a JSON listing file, step by step
    Create {
        /// Listing file with basic_details, auction_info and logistics
        file: PathBuf,
        /// Images to attach after the draft is created
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
        /// Publish once every step is saved
        #[arg(long)]
        publish: bool,
    },
    /// Publish an existing draft
    Publish {
        /// Draft ID
        draft: String,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Show the wallet balance
    Balance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a deposit; prints the payment authorization URL
    Deposit {
        /// Amount, e.g. 5000 or 5000.00
        amount: String,
    },
    /// Withdraw from the wallet
    Withdraw {
        /// Amount, e.g. 5000 or 5000.00
        amount: String,
    },
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Confirm that an order was received
    Confirm {
        /// Order ID
        order: String,
    },
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Verify a payment reference and refresh the wallet
    Verify {
        /// Payment reference
        reference: String,
    },
}
