//! Multi-step listing creation.
//!
//! The wizard walks basic details → auction info → logistics. Each `next`
//! persists the current step before the step pointer moves, so the wizard
//! never gets ahead of what the server has stored. Publishing is terminal.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{
    reindex_positions, AuctionInfo, BasicDetails, DraftId, Image, ImageOwner, ListingDraft,
    Logistics, WizardStep,
};
use crate::rpc::{DraftItem, DraftUpdate, PublishedItem, RpcClient};
use crate::uploads::UploadApi;
use crate::validation::{FileSelection, UploadPolicy, ValidationError};

/// Draft persistence used by the wizard.
pub trait DraftApi: Send + Sync {
    fn create_draft(&self, details: &BasicDetails)
        -> impl Future<Output = Result<DraftItem>> + Send;

    fn update_draft(
        &self,
        id: DraftId,
        update: &DraftUpdate,
    ) -> impl Future<Output = Result<DraftItem>> + Send;

    fn publish(&self, id: DraftId) -> impl Future<Output = Result<PublishedItem>> + Send;
}

impl DraftApi for RpcClient {
    async fn create_draft(&self, details: &BasicDetails) -> Result<DraftItem> {
        self.create_draft_item(details).await
    }

    async fn update_draft(&self, id: DraftId, update: &DraftUpdate) -> Result<DraftItem> {
        self.update_draft_item(id, update).await
    }

    async fn publish(&self, id: DraftId) -> Result<PublishedItem> {
        self.publish_item(id).await
    }
}

/// Local wizard transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardAction {
    SetBasicDetails(BasicDetails),
    SetAuctionInfo(AuctionInfo),
    SetLogistics(Logistics),
    DraftSaved(DraftId),
    ImageUploaded(Image),
    Advance,
    Back,
    Published,
}

/// Apply one action. A published draft ignores everything.
pub fn reduce(mut draft: ListingDraft, action: WizardAction) -> ListingDraft {
    if draft.published {
        return draft;
    }
    match action {
        WizardAction::SetBasicDetails(details) => draft.basic_details = details,
        WizardAction::SetAuctionInfo(info) => draft.auction_info = Some(info),
        WizardAction::SetLogistics(logistics) => draft.logistics = logistics,
        WizardAction::DraftSaved(id) => draft.draft_id = Some(id),
        WizardAction::ImageUploaded(image) => {
            if !draft.uploaded_images.iter().any(|known| known.id == image.id) {
                draft.uploaded_images.push(image);
                reindex_positions(&mut draft.uploaded_images);
            }
        }
        WizardAction::Advance => {
            if let Some(next) = draft.step.next() {
                draft.step = next;
            }
        }
        WizardAction::Back => {
            if let Some(previous) = draft.step.previous() {
                draft.step = previous;
            }
        }
        WizardAction::Published => draft.published = true,
    }
    draft
}

/// Result of a successful [`ListingWizard::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(WizardStep),
    /// Every step is saved; the draft can be previewed and published.
    ReadyForPreview(DraftId),
}

/// Outcome of [`ListingWizard::select_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub accepted: usize,
    pub rejected: Vec<ValidationError>,
    pub dropped: usize,
}

pub struct ListingWizard<D, U> {
    drafts: D,
    uploads: U,
    policy: UploadPolicy,
    draft: ListingDraft,
    selected_files: Vec<FileSelection>,
    ready_for_preview: bool,
}

impl<D: DraftApi, U: UploadApi> ListingWizard<D, U> {
    pub fn new(drafts: D, uploads: U, policy: UploadPolicy) -> Self {
        Self {
            drafts,
            uploads,
            policy,
            draft: ListingDraft::default(),
            selected_files: Vec::new(),
            ready_for_preview: false,
        }
    }

    pub const fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    pub const fn step(&self) -> WizardStep {
        self.draft.step
    }

    /// Files waiting to be uploaded once the draft exists.
    pub fn selected_files(&self) -> &[FileSelection] {
        &self.selected_files
    }

    fn dispatch(&mut self, action: WizardAction) {
        let draft = std::mem::take(&mut self.draft);
        self.draft = reduce(draft, action);
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.draft.published {
            return Err(Error::AlreadyPublished);
        }
        Ok(())
    }

    /// Steps behind the current one are only saved again after `back()`,
    /// so editing them in place is refused. Any edit clears the preview.
    fn begin_edit(&mut self, step: WizardStep) -> Result<()> {
        self.ensure_editable()?;
        if self.draft.step > step {
            return Err(Error::InvalidInput(format!(
                "go back to step {} before editing it",
                step.number()
            )));
        }
        self.ready_for_preview = false;
        Ok(())
    }

    pub fn set_basic_details(&mut self, details: BasicDetails) -> Result<()> {
        self.begin_edit(WizardStep::BasicDetails)?;
        self.dispatch(WizardAction::SetBasicDetails(details));
        Ok(())
    }

    pub fn set_auction_info(&mut self, info: AuctionInfo) -> Result<()> {
        self.begin_edit(WizardStep::AuctionInfo)?;
        self.dispatch(WizardAction::SetAuctionInfo(info));
        Ok(())
    }

    pub fn set_logistics(&mut self, logistics: Logistics) -> Result<()> {
        self.begin_edit(WizardStep::Logistics)?;
        self.dispatch(WizardAction::SetLogistics(logistics));
        Ok(())
    }

    /// Queue images on step 1. Invalid files are reported; files beyond the
    /// image limit are dropped from the end of the batch.
    pub fn select_files(&mut self, files: Vec<FileSelection>) -> Result<SelectionReport> {
        self.ensure_editable()?;
        if self.draft.step != WizardStep::BasicDetails {
            return Err(Error::InvalidInput(
                "images are selected on the basic details step".to_string(),
            ));
        }

        let mut report = SelectionReport::default();
        let mut valid = Vec::with_capacity(files.len());
        for file in files {
            match self.policy.validate_file(&file) {
                Ok(()) => valid.push(file),
                Err(error) => report.rejected.push(error),
            }
        }
        let occupied = self.draft.uploaded_images.len() + self.selected_files.len();
        let (accepted, dropped) = self.policy.fit_capacity(occupied, valid);
        report.accepted = accepted.len();
        report.dropped = dropped;
        self.selected_files.extend(accepted);
        Ok(report)
    }

    pub fn unselect_file(&mut self, index: usize) -> Option<FileSelection> {
        (index < self.selected_files.len()).then(|| self.selected_files.remove(index))
    }

    /// Validate and persist the current step, then advance.
    pub async fn next(&mut self) -> Result<StepOutcome> {
        self.ensure_editable()?;
        match self.draft.step {
            WizardStep::BasicDetails => {
                let details = self.draft.basic_details.clone();
                details.validate()?;
                let draft_id = match self.draft.draft_id {
                    None => {
                        let created = self.drafts.create_draft(&details).await?;
                        tracing::info!(draft_id = %created.id, "Created draft listing");
                        created.id
                    }
                    Some(draft_id) => {
                        self.drafts
                            .update_draft(draft_id, &DraftUpdate::BasicDetails(details))
                            .await?;
                        draft_id
                    }
                };
                self.dispatch(WizardAction::DraftSaved(draft_id));
                self.upload_selected(draft_id).await?;
            }
            WizardStep::AuctionInfo => {
                let draft_id = self.saved_draft_id()?;
                let info = self
                    .draft
                    .auction_info
                    .clone()
                    .ok_or(ValidationError::MissingField("auction_info"))?;
                info.validate(Utc::now())?;
                self.drafts
                    .update_draft(draft_id, &DraftUpdate::AuctionInfo(info))
                    .await?;
            }
            WizardStep::Logistics => {
                let draft_id = self.saved_draft_id()?;
                let logistics = self.draft.logistics.clone();
                logistics.validate()?;
                self.drafts
                    .update_draft(draft_id, &DraftUpdate::Logistics(logistics))
                    .await?;
                self.ready_for_preview = true;
                tracing::info!(%draft_id, "Draft ready for preview");
                return Ok(StepOutcome::ReadyForPreview(draft_id));
            }
        }

        self.dispatch(WizardAction::Advance);
        tracing::debug!(step = self.draft.step.number(), "Wizard advanced");
        Ok(StepOutcome::Advanced(self.draft.step))
    }

    /// Move back one step without touching the server.
    pub fn back(&mut self) -> Result<WizardStep> {
        self.ensure_editable()?;
        self.ready_for_preview = false;
        self.dispatch(WizardAction::Back);
        Ok(self.draft.step)
    }

    /// Publish a draft whose steps have all been saved.
    pub async fn publish(&mut self) -> Result<PublishedItem> {
        self.ensure_editable()?;
        let draft_id = self.saved_draft_id()?;
        if !self.ready_for_preview {
            return Err(Error::InvalidInput(
                "save the logistics step before publishing".to_string(),
            ));
        }
        let published = self.drafts.publish(draft_id).await?;
        self.dispatch(WizardAction::Published);
        tracing::info!(item_id = %published.id, "Published listing");
        Ok(published)
    }

    fn saved_draft_id(&self) -> Result<DraftId> {
        self.draft
            .draft_id
            .ok_or_else(|| Error::InvalidInput("the draft has not been saved yet".to_string()))
    }

    /// Upload queued files one at a time; the first failure stops the rest.
    async fn upload_selected(&mut self, draft_id: DraftId) -> Result<()> {
        let owner = ImageOwner::Item(draft_id);
        while let Some(file) = self.selected_files.first().cloned() {
            let file_name = file.name.clone();
            let image = self
                .uploads
                .upload(owner, file, Arc::new(|_| {}))
                .await
                .inspect_err(|error| {
                    tracing::warn!(%draft_id, file = %file_name, %error, "Draft image upload failed");
                })?;
            self.selected_files.remove(0);
            self.dispatch(WizardAction::ImageUploaded(image));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        positions_are_contiguous, Amount, AuctionStatus, DeliveryOption, ImageId, ItemId,
    };
    use crate::uploads::UploadProgress;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct FakeDrafts {
        fail_create: Arc<AtomicBool>,
        fail_updates: Arc<AtomicBool>,
        calls: Arc<Mutex<Vec<String>>>,
        id: Option<DraftId>,
    }

    impl FakeDrafts {
        fn new() -> Self {
            Self {
                id: Some(ItemId::from_uuid(Uuid::now_v7())),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn item(&self) -> DraftItem {
            DraftItem {
                id: self.id.unwrap(),
                title: String::new(),
                status: AuctionStatus::Draft,
            }
        }
    }

    impl DraftApi for FakeDrafts {
        async fn create_draft(&self, details: &BasicDetails) -> Result<DraftItem> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create:{}", details.title));
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(Error::Api("database unavailable (500)".to_string()));
            }
            Ok(self.item())
        }

        async fn update_draft(&self, _id: DraftId, update: &DraftUpdate) -> Result<DraftItem> {
            let step = match update {
                DraftUpdate::BasicDetails(_) => "basic_details",
                DraftUpdate::AuctionInfo(_) => "auction_info",
                DraftUpdate::Logistics(_) => "logistics",
            };
            self.calls.lock().unwrap().push(format!("update:{step}"));
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(Error::Api("conflict (409)".to_string()));
            }
            Ok(self.item())
        }

        async fn publish(&self, id: DraftId) -> Result<PublishedItem> {
            self.calls.lock().unwrap().push("publish".to_string());
            Ok(PublishedItem {
                id,
                status: AuctionStatus::Active,
            })
        }
    }

    #[derive(Clone, Default)]
    struct FakeUploads {
        uploaded: Arc<Mutex<Vec<String>>>,
    }

    impl UploadApi for FakeUploads {
        async fn upload(
            &self,
            owner: ImageOwner,
            file: FileSelection,
            _progress: UploadProgress,
        ) -> Result<Image> {
            assert!(matches!(owner, ImageOwner::Item(_)));
            if file.name.starts_with("fail") {
                return Err(Error::Api("upload rejected (422)".to_string()));
            }
            self.uploaded.lock().unwrap().push(file.name);
            Ok(Image {
                id: ImageId::from_uuid(Uuid::now_v7()),
                position: 0,
                variants: BTreeMap::new(),
            })
        }

        async fn delete(&self, _image_id: ImageId) -> Result<()> {
            Ok(())
        }

        async fn reorder(&self, _item_id: ItemId, _image_ids: Vec<ImageId>) -> Result<()> {
            Ok(())
        }
    }

    fn details() -> BasicDetails {
        BasicDetails {
            title: "Film camera".to_string(),
            description: "Works".to_string(),
            ..BasicDetails::default()
        }
    }

    fn auction_info() -> AuctionInfo {
        AuctionInfo {
            starting_price: Amount::from_cents(5000),
            reserve_price: None,
            buy_now_price: None,
            start_time: None,
            end_time: Utc::now() + chrono::Duration::days(3),
        }
    }

    fn logistics() -> Logistics {
        Logistics {
            delivery_options: vec![DeliveryOption::Pickup],
            location: "Lagos".to_string(),
            shipping_fee: None,
        }
    }

    fn jpeg(name: &str) -> FileSelection {
        FileSelection::new(name, Some("image/jpeg"), vec![1u8; 16])
    }

    #[test]
    fn reducer_moves_within_bounds() {
        let draft = reduce(ListingDraft::default(), WizardAction::Back);
        assert_eq!(draft.step, WizardStep::BasicDetails);

        let draft = reduce(reduce(draft, WizardAction::Advance), WizardAction::Advance);
        assert_eq!(draft.step, WizardStep::Logistics);
        let draft = reduce(draft, WizardAction::Advance);
        assert_eq!(draft.step, WizardStep::Logistics);
    }

    #[test]
    fn reducer_ignores_actions_after_publish() {
        let published = reduce(ListingDraft::default(), WizardAction::Published);
        let after = reduce(published.clone(), WizardAction::SetBasicDetails(details()));
        assert_eq!(after, published);
    }

    #[tokio::test]
    async fn failed_draft_creation_keeps_step_one() {
        let drafts = FakeDrafts::new();
        drafts.fail_create.store(true, Ordering::SeqCst);
        let mut wizard =
            ListingWizard::new(drafts.clone(), FakeUploads::default(), UploadPolicy::default());
        wizard.set_basic_details(details()).unwrap();

        assert!(wizard.next().await.is_err());
        assert_eq!(wizard.step(), WizardStep::BasicDetails);
        assert_eq!(wizard.draft().draft_id, None);

        drafts.fail_create.store(false, Ordering::SeqCst);
        assert_eq!(
            wizard.next().await.unwrap(),
            StepOutcome::Advanced(WizardStep::AuctionInfo)
        );
    }

    #[tokio::test]
    async fn edits_after_preview_require_another_save() {
        let drafts = FakeDrafts::new();
        let mut wizard =
            ListingWizard::new(drafts.clone(), FakeUploads::default(), UploadPolicy::default());
        wizard.set_basic_details(details()).unwrap();
        wizard.next().await.unwrap();
        wizard.set_auction_info(auction_info()).unwrap();
        wizard.next().await.unwrap();
        wizard.set_logistics(logistics()).unwrap();
        wizard.next().await.unwrap();

        let renamed = BasicDetails {
            title: "Renamed camera".to_string(),
            ..details()
        };
        assert!(matches!(
            wizard.set_basic_details(renamed.clone()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            wizard.set_auction_info(auction_info()),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(wizard.draft().basic_details, details());

        wizard.set_logistics(logistics()).unwrap();
        assert!(matches!(wizard.publish().await, Err(Error::InvalidInput(_))));

        wizard.back().unwrap();
        wizard.back().unwrap();
        wizard.set_basic_details(renamed.clone()).unwrap();
        wizard.next().await.unwrap();
        wizard.next().await.unwrap();
        wizard.next().await.unwrap();
        wizard.publish().await.unwrap();
        assert_eq!(wizard.draft().basic_details, renamed);
        let basic_saves = drafts
            .calls()
            .iter()
            .filter(|call| *call == "update:basic_details")
            .count();
        assert_eq!(basic_saves, 1);
    }

    #[tokio::test]
    async fn invalid_step_is_never_sent() {
        let drafts = FakeDrafts::new();
        let mut wizard =
            ListingWizard::new(drafts.clone(), FakeUploads::default(), UploadPolicy::default());

        assert!(matches!(
            wizard.next().await,
            Err(Error::Validation(ValidationError::MissingField("title")))
        ));
        assert!(drafts.calls().is_empty());
    }

    #[tokio::test]
    async fn full_flow_persists_each_step_then_publishes() {
        let drafts = FakeDrafts::new();
        let uploads = FakeUploads::default();
        let mut wizard =
            ListingWizard::new(drafts.clone(), uploads.clone(), UploadPolicy::default());

        wizard.set_basic_details(details()).unwrap();
        let report = wizard
            .select_files(vec![jpeg("front.jpg"), jpeg("back.jpg")])
            .unwrap();
        assert_eq!(report.accepted, 2);
        wizard.next().await.unwrap();
        assert!(wizard.selected_files().is_empty());
        assert_eq!(wizard.draft().uploaded_images.len(), 2);
        assert!(positions_are_contiguous(&wizard.draft().uploaded_images));

        wizard.set_auction_info(auction_info()).unwrap();
        wizard.next().await.unwrap();
        wizard.set_logistics(logistics()).unwrap();
        let outcome = wizard.next().await.unwrap();
        let draft_id = drafts.id.unwrap();
        assert_eq!(outcome, StepOutcome::ReadyForPreview(draft_id));
        assert_eq!(wizard.step(), WizardStep::Logistics);

        let published = wizard.publish().await.unwrap();
        assert_eq!(published.id, draft_id);
        assert!(wizard.draft().published);
        assert!(matches!(
            wizard.set_logistics(logistics()),
            Err(Error::AlreadyPublished)
        ));
        assert!(matches!(wizard.next().await, Err(Error::AlreadyPublished)));

        assert_eq!(
            drafts.calls(),
            vec![
                "create:Film camera",
                "update:auction_info",
                "update:logistics",
                "publish"
            ]
        );
        assert_eq!(
            uploads.uploaded.lock().unwrap().clone(),
            vec!["front.jpg", "back.jpg"]
        );
    }

    #[tokio::test]
    async fn upload_failure_aborts_remaining_files() {
        let drafts = FakeDrafts::new();
        let uploads = FakeUploads::default();
        let mut wizard =
            ListingWizard::new(drafts.clone(), uploads.clone(), UploadPolicy::default());
        wizard.set_basic_details(details()).unwrap();
        wizard
            .select_files(vec![jpeg("one.jpg"), jpeg("fail.jpg"), jpeg("three.jpg")])
            .unwrap();

        assert!(wizard.next().await.is_err());
        assert_eq!(wizard.step(), WizardStep::BasicDetails);
        assert!(wizard.draft().draft_id.is_some());
        assert_eq!(wizard.draft().uploaded_images.len(), 1);
        let remaining: Vec<_> = wizard
            .selected_files()
            .iter()
            .map(|file| file.name.as_str())
            .collect();
        assert_eq!(remaining, vec!["fail.jpg", "three.jpg"]);
        assert_eq!(uploads.uploaded.lock().unwrap().clone(), vec!["one.jpg"]);

        // Resubmitting updates the existing draft instead of creating another.
        wizard.unselect_file(0);
        wizard.next().await.unwrap();
        assert_eq!(
            drafts.calls(),
            vec!["create:Film camera", "update:basic_details"]
        );
    }

    #[tokio::test]
    async fn failed_update_does_not_advance_and_back_is_local() {
        let drafts = FakeDrafts::new();
        let mut wizard =
            ListingWizard::new(drafts.clone(), FakeUploads::default(), UploadPolicy::default());
        wizard.set_basic_details(details()).unwrap();
        wizard.next().await.unwrap();

        wizard.set_auction_info(auction_info()).unwrap();
        drafts.fail_updates.store(true, Ordering::SeqCst);
        assert!(wizard.next().await.is_err());
        assert_eq!(wizard.step(), WizardStep::AuctionInfo);

        let calls_before = drafts.calls().len();
        assert_eq!(wizard.back().unwrap(), WizardStep::BasicDetails);
        assert_eq!(drafts.calls().len(), calls_before);
        assert!(wizard.publish().await.is_err());
    }

    #[test]
    fn selection_respects_image_limit() {
        let policy = UploadPolicy {
            max_images: 2,
            ..UploadPolicy::default()
        };
        let mut wizard = ListingWizard::new(FakeDrafts::new(), FakeUploads::default(), policy);
        let report = wizard
            .select_files(vec![
                jpeg("a.jpg"),
                FileSelection::new("b.txt", None, vec![1u8]),
                jpeg("c.jpg"),
                jpeg("d.jpg"),
            ])
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.dropped, 1);
    }
}
