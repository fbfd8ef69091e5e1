use std::path::{Path, PathBuf};

use angle_core::models::{AuctionInfo, BasicDetails, DraftId, Logistics};
use angle_core::rpc::RpcClient;
use angle_core::uploads::HttpUploadApi;
use angle_core::validation::{FileSelection, UploadPolicy};
use angle_core::wizard::{ListingWizard, StepOutcome};
use serde::Deserialize;

use crate::cli::ListingCommands;
use crate::commands::common::{open_session, parse_id};
use crate::error::CliError;

/// Listing file accepted by `angle listing create`.
#[derive(Debug, Deserialize)]
pub struct ListingFile {
    pub basic_details: BasicDetails,
    pub auction_info: AuctionInfo,
    pub logistics: Logistics,
}

pub fn read_listing_file(path: &Path) -> Result<ListingFile, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub async fn run_listing(
    command: ListingCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ListingCommands::Create {
            file,
            images,
            publish,
        } => run_listing_create(global_profile, &file, &images, publish).await,
        ListingCommands::Publish { draft } => {
            let draft_id: DraftId = parse_id("draft", &draft)?;
            let session = open_session(global_profile).await?;
            let published = RpcClient::new(session).publish_item(draft_id).await?;
            println!("Published {} ({:?})", published.id, published.status);
            Ok(())
        }
    }
}

async fn run_listing_create(
    global_profile: Option<&str>,
    file: &Path,
    images: &[PathBuf],
    publish: bool,
) -> Result<(), CliError> {
    let listing = read_listing_file(file)?;
    let mut selections = Vec::with_capacity(images.len());
    for path in images {
        selections.push(FileSelection::from_path(path).await?);
    }

    let session = open_session(global_profile).await?;
    let policy = UploadPolicy::from_config(session.config(), true);
    let mut wizard = ListingWizard::new(
        RpcClient::new(session.clone()),
        HttpUploadApi::new(session),
        policy,
    );

    wizard.set_basic_details(listing.basic_details)?;
    let report = wizard.select_files(selections)?;
    for error in &report.rejected {
        eprintln!("Skipped: {error}");
    }
    if report.dropped > 0 {
        eprintln!("Skipped {} image(s): image limit reached", report.dropped);
    }
    print_outcome(wizard.next().await?);

    wizard.set_auction_info(listing.auction_info)?;
    print_outcome(wizard.next().await?);

    wizard.set_logistics(listing.logistics)?;
    print_outcome(wizard.next().await?);

    if publish {
        let published = wizard.publish().await?;
        println!("Published {} ({:?})", published.id, published.status);
    }
    Ok(())
}

fn print_outcome(outcome: StepOutcome) {
    match outcome {
        StepOutcome::Advanced(step) => println!("Saved; continuing with step {}", step.number()),
        StepOutcome::ReadyForPreview(draft_id) => println!("Draft {draft_id} is ready to publish"),
    }
}
