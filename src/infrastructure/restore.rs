use crate::domain::catalog::Platform;
use crate::domain::ports::{ExtensionProvider, RestoreCallback, RestoreStrategy, StoreFamily};

pub const EXTENSION_UNAVAILABLE: &str = "store extension unavailable";

fn restore_through(
    store: StoreFamily,
    extensions: &dyn ExtensionProvider,
    callback: RestoreCallback,
) {
    match extensions.extension(store) {
        Some(extension) => extension.restore_transactions(callback),
        None => {
            tracing::error!(?store, "Store extension missing, cannot restore");
            callback(false, Some(EXTENSION_UNAVAILABLE.to_string()));
        }
    }
}

/// Restores through the App Store on Apple platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleRestoreStrategy;

impl RestoreStrategy for AppleRestoreStrategy {
    fn name(&self) -> &'static str {
        "apple"
    }

    fn is_available(&self, platform: Platform) -> bool {
        matches!(
            platform,
            Platform::Ios | Platform::TvOs | Platform::VisionOs | Platform::MacOs
        )
    }

    fn restore(&self, extensions: &dyn ExtensionProvider, callback: RestoreCallback) {
        restore_through(StoreFamily::AppleAppStore, extensions, callback);
    }
}

/// Restores through Google Play on Android.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleRestoreStrategy;

impl RestoreStrategy for GoogleRestoreStrategy {
    fn name(&self) -> &'static str {
        "google"
    }

    fn is_available(&self, platform: Platform) -> bool {
        platform == Platform::Android
    }

    fn restore(&self, extensions: &dyn ExtensionProvider, callback: RestoreCallback) {
        restore_through(StoreFamily::GooglePlay, extensions, callback);
    }
}

/// Picks the restore strategy for a platform.
///
/// Strategies are tried in registration order and the first available one
/// wins, so overlapping strategies resolve deterministically.
#[derive(Default)]
pub struct RestoreSelector {
    strategies: Vec<Box<dyn RestoreStrategy>>,
}

impl RestoreSelector {
    pub fn new(strategies: Vec<Box<dyn RestoreStrategy>>) -> Self {
        Self { strategies }
    }

    /// Apple and Google strategies.
    pub fn platform_defaults() -> Self {
        Self::new(vec![
            Box::new(AppleRestoreStrategy),
            Box::new(GoogleRestoreStrategy),
        ])
    }

    pub fn select(&self, platform: Platform) -> Option<&dyn RestoreStrategy> {
        self.strategies
            .iter()
            .find(|s| s.is_available(platform))
            .map(|s| s.as_ref())
    }
}
