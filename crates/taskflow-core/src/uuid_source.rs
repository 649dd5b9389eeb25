//! Identifier generation is an injected collaborator, not a core concern,
//! which keeps `Storage::inject` testable without relying on a global RNG.

use uuid::Uuid;

pub trait UuidSource {
    fn next_uuid(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUuidSource;

impl UuidSource for RandomUuidSource {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}
