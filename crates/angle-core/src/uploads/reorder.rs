//! Order manipulation for confirmed image lists.

use crate::error::{Error, Result};
use crate::models::{reindex_positions, Image, ImageId};

/// Move the image at `from` to `to` and renumber positions from 0.
pub fn move_image(images: &[Image], from: usize, to: usize) -> Result<Vec<Image>> {
    if from >= images.len() || to >= images.len() {
        return Err(Error::InvalidInput(format!(
            "cannot move image {from} to {to} in a list of {}",
            images.len()
        )));
    }
    let mut reordered = images.to_vec();
    let moved = reordered.remove(from);
    reordered.insert(to, moved);
    reindex_positions(&mut reordered);
    Ok(reordered)
}

/// Put `current` back into the order recorded in `snapshot`.
///
/// Images confirmed after the snapshot keep their relative order at the end;
/// images removed since are not brought back.
pub fn restore_order(snapshot: &[ImageId], current: &[Image]) -> Vec<Image> {
    let mut restored: Vec<Image> = snapshot
        .iter()
        .filter_map(|id| current.iter().find(|image| image.id == *id).cloned())
        .collect();
    restored.extend(
        current
            .iter()
            .filter(|image| !snapshot.contains(&image.id))
            .cloned(),
    );
    reindex_positions(&mut restored);
    restored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::positions_are_contiguous;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn images(count: u32) -> Vec<Image> {
        (0..count)
            .map(|position| Image {
                id: ImageId::from_uuid(Uuid::now_v7()),
                position,
                variants: BTreeMap::new(),
            })
            .collect()
    }

    fn ids(images: &[Image]) -> Vec<ImageId> {
        images.iter().map(|image| image.id).collect()
    }

    #[test]
    fn moving_last_to_front_renumbers() {
        let original = images(3);
        let moved = move_image(&original, 2, 0).unwrap();

        assert_eq!(
            ids(&moved),
            vec![original[2].id, original[0].id, original[1].id]
        );
        assert_eq!(
            moved.iter().map(|image| image.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn out_of_range_moves_are_rejected() {
        assert!(move_image(&images(2), 0, 2).is_err());
        assert!(move_image(&[], 0, 0).is_err());
    }

    #[test]
    fn restore_returns_exact_original_order() {
        let original = images(4);
        let snapshot = ids(&original);
        let moved = move_image(&original, 3, 1).unwrap();

        assert_eq!(restore_order(&snapshot, &moved), original);
    }

    #[test]
    fn restore_keeps_new_and_drops_removed_images() {
        let original = images(3);
        let snapshot = ids(&original);
        let mut current = move_image(&original, 0, 2).unwrap();
        current.retain(|image| image.id != original[1].id);
        let added = images(1).remove(0);
        current.push(added.clone());

        let restored = restore_order(&snapshot, &current);
        assert_eq!(ids(&restored), vec![original[0].id, original[2].id, added.id]);
        assert!(positions_are_contiguous(&restored));
    }
}
