/// Collaborator producing collision-resistant identifiers (spec §6
/// `IdGenerator`).
///
/// `ArtifactStore::store` mints a fresh artifact id per spec §4.2 step 5;
/// everything else in the core receives its ids (`JobId`, `EntityId`,
/// `NodeId`, `RegionId`) from the caller.
pub trait IdGenerator: Send + Sync {
    /// Generates a new, globally unique identifier string.
    fn generate(&self) -> String;
}

/// Production `IdGenerator` backed by UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_ids() {
        let gen = RandomIdGenerator;
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
    }
}
