mod profile;

pub use profile::{AppId, Profile, ProfileDraft, ProfileId};
