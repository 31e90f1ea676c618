use serde::{Deserialize, Serialize};
use std::fmt;

/// Dispatch bucket for posted callbacks.
///
/// Every tick drains the categories in declaration order: input first, then
/// animation, traversal (layout + draw) and finally commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Input,
    Animation,
    Traversal,
    Commit,
}

impl Category {
    /// All categories in dispatch order.
    pub const ALL: [Category; 4] = [
        Category::Input,
        Category::Animation,
        Category::Traversal,
        Category::Commit,
    ];

    /// The category frame callbacks are posted into.
    pub const FRAME_CALLBACK: Category = Category::Animation;

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Input => "input",
            Category::Animation => "animation",
            Category::Traversal => "traversal",
            Category::Commit => "commit",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
