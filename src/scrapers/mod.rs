pub mod browser;
pub mod extract;
pub mod madlan;
pub mod onmap;
pub mod paging;
pub mod traits;
pub mod yad2;

pub use browser::{ChromeProvider, ChromeSession, RenderSurface, SurfaceProvider};
pub use madlan::MadlanAdapter;
pub use onmap::OnmapAdapter;
pub use traits::{ScrapeOutcome, SourceAdapter};
pub use yad2::Yad2Adapter;
