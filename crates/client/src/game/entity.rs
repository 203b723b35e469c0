// Entity records, one per (view, id) pair plus one merged copy per id

use glam::Vec2;
use protocol::packets::CellUpdate;
use protocol::Color;

const FADE_DURATION_MS: f64 = 120.0;
const DEFAULT_COLOR: Color = Color::new(200, 200, 200);

/// Why an entity stopped being alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadTo {
    /// Eaten by the entity with this id.
    Killed(u32),
    /// Dropped out of the connection's view without being eaten.
    LeftView,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Death {
    pub at: f64,
    pub to: DeadTo,
}

/// Optional fields that later upserts may omit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptors {
    pub color: Option<Color>,
    pub skin: Option<String>,
    pub name: Option<String>,
}

/// A cell as observed by one view, or the merged render-facing copy.
///
/// `new_*` always holds the latest value received; `old_*` is where the
/// animation toward it started, captured at `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub old_pos: Vec2,
    pub new_pos: Vec2,
    pub old_r: f32,
    pub new_r: f32,
    /// Softly eased radius for jelly rendering, sampled at `jelly_at`.
    pub jelly_r: f32,
    pub jelly_at: f64,
    pub color: Color,
    pub spiked: bool,
    pub pellet: bool,
    pub ejected: bool,
    pub name: String,
    pub skin: Option<String>,
    pub clan: String,
    pub subscriber: bool,
    pub updated_at: f64,
    pub born_at: f64,
    pub death: Option<Death>,
}

impl Entity {
    /// A freshly sighted entity, at rest on its first reported position.
    pub fn spawn(update: &CellUpdate, now: f64) -> Self {
        let pos = Vec2::new(update.x as f32, update.y as f32);
        let r = update.r as f32;
        let mut entity = Self {
            id: update.id,
            old_pos: pos,
            new_pos: pos,
            old_r: r,
            new_r: r,
            jelly_r: r,
            jelly_at: now,
            color: DEFAULT_COLOR,
            spiked: false,
            pellet: false,
            ejected: false,
            name: String::new(),
            skin: None,
            clan: String::new(),
            subscriber: false,
            updated_at: now,
            born_at: now,
            death: None,
        };
        entity.apply_fields(update);
        entity
    }

    /// Copy the per-update fields. Color, skin and name are only replaced
    /// when the update carries them.
    pub fn apply_fields(&mut self, update: &CellUpdate) {
        if let Some(color) = update.color {
            self.color = color;
        }
        if let Some(ref skin) = update.skin {
            self.skin = normalize_skin(skin);
        }
        if let Some(ref name) = update.name {
            self.name.clone_from(name);
        }
        self.spiked = update.flags.spiked;
        self.pellet = update.flags.pellet;
        self.ejected = update.flags.ejected;
        self.clan.clone_from(&update.clan);
        self.subscriber = update.subscriber;
    }

    /// Fill the fields `update` omitted from a previous occupant of this id.
    pub fn inherit(&mut self, previous: &Descriptors, update: &CellUpdate) {
        if update.color.is_none() {
            if let Some(color) = previous.color {
                self.color = color;
            }
        }
        if update.skin.is_none() && previous.skin.is_some() {
            self.skin.clone_from(&previous.skin);
        }
        if update.name.is_none() {
            if let Some(ref name) = previous.name {
                self.name.clone_from(name);
            }
        }
    }

    pub fn descriptors(&self) -> Descriptors {
        Descriptors {
            color: Some(self.color),
            skin: self.skin.clone(),
            name: (!self.name.is_empty()).then(|| self.name.clone()),
        }
    }

    /// Copy everything but the animation state from `model`.
    pub fn copy_descriptors(&mut self, model: &Entity) {
        self.color = model.color;
        self.spiked = model.spiked;
        self.pellet = model.pellet;
        self.ejected = model.ejected;
        self.subscriber = model.subscriber;
        if self.name != model.name {
            self.name.clone_from(&model.name);
        }
        if self.skin != model.skin {
            self.skin.clone_from(&model.skin);
        }
        if self.clan != model.clan {
            self.clan.clone_from(&model.clan);
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    #[inline]
    pub fn dead_at(&self) -> Option<f64> {
        self.death.map(|d| d.at)
    }

    /// Id of the entity that ate this one, if it was eaten.
    #[inline]
    pub fn killer(&self) -> Option<u32> {
        match self.death {
            Some(Death {
                to: DeadTo::Killed(id),
                ..
            }) => Some(id),
            _ => None,
        }
    }

    /// Dead because it left the view rather than being eaten.
    #[inline]
    pub fn left_view(&self) -> bool {
        matches!(
            self.death,
            Some(Death {
                to: DeadTo::LeftView,
                ..
            })
        )
    }

    /// Latest reported position and radius match exactly.
    #[inline]
    pub fn agrees_with(&self, other: &Entity) -> bool {
        self.new_pos == other.new_pos && self.new_r == other.new_r
    }

    /// mass = r² / 100, floored, on the latest reported radius
    #[inline]
    pub fn mass(&self) -> u32 {
        (self.new_r * self.new_r / 100.0) as u32
    }

    /// Render opacity: fades in after birth and out after death.
    pub fn alpha(&self, now: f64) -> f32 {
        let born = ((now - self.born_at) / FADE_DURATION_MS).clamp(0.0, 1.0);
        let dying = match self.death {
            Some(death) => (1.0 - (now - death.at) / FADE_DURATION_MS).clamp(0.0, 1.0),
            None => 1.0,
        };
        (born * dying) as f32
    }
}

/// Skins may arrive with a leading '%'; empty means none.
fn normalize_skin(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let normalized = trimmed.strip_prefix('%').unwrap_or(trimmed);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}
