//! One-shot rewrite of legacy absolute image paths to relative.
//!
//! A prior on-disk format stored absolute sandbox paths in
//! `MailPackage::image_paths`. Those break whenever the sandbox root moves
//! (app reinstall/update), silently killing thumbnail loading. On load the
//! store rewrites them to paths relative to the user directory and persists
//! the result. Running the rewrite again is a no-op.

use std::path::Path;

use crate::model::MailPackage;

/// Rewrites absolute image paths in place. Returns `true` if anything
/// changed, so the caller knows to persist.
///
/// Rules, per path:
/// - relative: untouched;
/// - absolute under `user_dir`: stripped to the relative remainder;
/// - absolute elsewhere (stale sandbox root): reduced to its file name,
///   which is the stable part across sandbox moves.
pub fn relativize_image_paths(packages: &mut [MailPackage], user_dir: &Path) -> bool {
    let mut changed = false;

    for package in packages.iter_mut() {
        for image_path in package.image_paths.iter_mut() {
            let path = Path::new(image_path.as_str());
            if !path.is_absolute() {
                continue;
            }

            let relative = match path.strip_prefix(user_dir) {
                Ok(rest) => rest.to_string_lossy().into_owned(),
                Err(_) => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| image_path.clone()),
            };

            if relative != *image_path {
                *image_path = relative;
                changed = true;
            }
        }
    }

    changed
}
