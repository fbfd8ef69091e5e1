use std::path::PathBuf;

use angle_core::models::{Image, ImageId, ImageOwner};
use angle_core::rpc::RpcClient;
use angle_core::session::ApiSession;
use angle_core::uploads::{HttpUploadApi, ImageManager, Notice};
use angle_core::validation::{FileSelection, UploadPolicy};
use tokio::sync::broadcast::error::TryRecvError;

use crate::cli::ImageCommands;
use crate::commands::common::{format_image_lines, open_session, parse_id, parse_owner};
use crate::error::CliError;

pub async fn run_images(
    command: ImageCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ImageCommands::List { owner, json } => {
            let owner = parse_owner(&owner)?;
            let session = open_session(global_profile).await?;
            let images = RpcClient::new(session).list_images(owner).await?;
            print_images(&images, json)
        }
        ImageCommands::Upload { owner, files } => {
            let owner = parse_owner(&owner)?;
            let session = open_session(global_profile).await?;
            run_upload(session, owner, files).await
        }
        ImageCommands::Remove { owner, image } => {
            let owner = parse_owner(&owner)?;
            let image_id: ImageId = parse_id("image", &image)?;
            let session = open_session(global_profile).await?;
            let manager = open_manager(session, owner).await?;
            manager.remove(image_id).await?;
            let settled = manager.settled().await?;
            print_images(&settled.confirmed, false)
        }
        ImageCommands::Reorder { item, from, to } => {
            let owner = ImageOwner::Item(parse_id("item", &item)?);
            let session = open_session(global_profile).await?;
            let manager = open_manager(session, owner).await?;
            if from >= manager.snapshot().confirmed.len() {
                return Err(CliError::ImageNotFound(from));
            }
            manager.reorder(from, to).await?;
            let settled = manager.settled().await?;
            print_images(&settled.confirmed, false)
        }
    }
}

async fn open_manager(session: ApiSession, owner: ImageOwner) -> Result<ImageManager, CliError> {
    let policy = UploadPolicy::from_config(session.config(), !owner.is_single_image());
    let confirmed = RpcClient::new(session.clone()).list_images(owner).await?;
    Ok(ImageManager::spawn(
        HttpUploadApi::new(session),
        owner,
        policy,
        confirmed,
    ))
}

async fn run_upload(
    session: ApiSession,
    owner: ImageOwner,
    paths: Vec<PathBuf>,
) -> Result<(), CliError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(FileSelection::from_path(path).await?);
    }

    let manager = open_manager(session, owner).await?;
    let mut notices = manager.notices();
    let report = manager.add(files).await?;
    for error in &report.rejected {
        eprintln!("Skipped: {error}");
    }
    if report.dropped > 0 {
        eprintln!("Skipped {} file(s): image limit reached", report.dropped);
    }

    let mut failed = 0usize;
    let settled = manager.settled();
    tokio::pin!(settled);
    let settled = loop {
        tokio::select! {
            result = &mut settled => break result?,
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    failed += report_notice(&notice);
                }
            }
        }
    };
    loop {
        match notices.try_recv() {
            Ok(notice) => failed += report_notice(&notice),
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    print_images(&settled.confirmed, false)?;
    if failed > 0 {
        return Err(CliError::UploadsFailed(failed));
    }
    Ok(())
}

fn report_notice(notice: &Notice) -> usize {
    match notice {
        Notice::Uploaded { .. } => {
            println!("{notice}");
            0
        }
        Notice::UploadFailed { .. } => {
            eprintln!("{notice}");
            1
        }
        Notice::RemoveFailed { .. } | Notice::ReorderFailed { .. } => {
            eprintln!("{notice}");
            0
        }
    }
}

fn print_images(images: &[Image], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(images)?);
    } else if images.is_empty() {
        println!("No images.");
    } else {
        for line in format_image_lines(images) {
            println!("{line}");
        }
    }
    Ok(())
}
