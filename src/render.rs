use tracing::info;

use crate::skin::Skin;

/// What the lobby needs from the avatar preview
pub trait AvatarRenderer: Send {
    fn set_avatar_skin(&mut self, skin: Skin);
}

/// Stand-in preview that only logs skin changes
#[derive(Debug, Default)]
pub struct TracingRenderer {
    current: Option<Skin>,
}

impl TracingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Skin> {
        self.current
    }
}

impl AvatarRenderer for TracingRenderer {
    fn set_avatar_skin(&mut self, skin: Skin) {
        if self.current != Some(skin) {
            info!("Avatar skin set to {}", skin);
        }
        self.current = Some(skin);
    }
}
