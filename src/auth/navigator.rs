/// Leaves the current page for an external address.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), String>;
}

/// Opens addresses in the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) -> Result<(), String> {
        tracing::info!("Opening browser for OAuth login");
        open::that(url).map_err(|e| e.to_string())
    }
}
