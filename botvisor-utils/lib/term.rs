//! Terminal decorations shared by the binaries.

use std::sync::LazyLock;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// A green check mark.
pub static CHECKMARK: LazyLock<String> = LazyLock::new(|| format!("{}", console::style("✓").green()));

/// A red cross.
pub static CROSSMARK: LazyLock<String> = LazyLock::new(|| format!("{}", console::style("✗").red()));
