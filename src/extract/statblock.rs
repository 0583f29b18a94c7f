use serde::Serialize;
use thiserror::Error;

pub const STATBLOCK_FIELDS: usize = 5;

/// The five values the prompt asks for, in prompt order. Values stay text:
/// challenge ratings like "1/4" and armor classes like "15 (natural armor)"
/// are taken as the model wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statblock {
    pub name: String,
    pub challenge_rating: String,
    pub armor_class: String,
    #[serde(rename = "type")]
    pub creature_type: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} fields (name, challenge rating, armor class, type, size), got {found}")]
pub struct ArityError {
    pub expected: usize,
    pub found: usize,
}

impl TryFrom<Vec<String>> for Statblock {
    type Error = ArityError;

    fn try_from(fields: Vec<String>) -> Result<Self, Self::Error> {
        let found = fields.len();
        let Ok([name, challenge_rating, armor_class, creature_type, size]) = <[String; STATBLOCK_FIELDS]>::try_from(fields) else {
            return Err(ArityError { expected: STATBLOCK_FIELDS, found });
        };
        Ok(Statblock { name, challenge_rating, armor_class, creature_type, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn five_fields_map_in_prompt_order() {
        let sb = Statblock::try_from(fields(&["Owlbear", "3", "13", "Beast", "Large"])).unwrap();
        assert_eq!(sb.name, "Owlbear");
        assert_eq!(sb.challenge_rating, "3");
        assert_eq!(sb.armor_class, "13");
        assert_eq!(sb.creature_type, "Beast");
        assert_eq!(sb.size, "Large");
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = Statblock::try_from(fields(&["Owlbear", "3", "13", "Beast"])).unwrap_err();
        assert_eq!(err, ArityError { expected: 5, found: 4 });
        let err = Statblock::try_from(fields(&["a", "b", "c", "d", "e", "f"])).unwrap_err();
        assert_eq!(err.found, 6);
    }

    #[test]
    fn serializes_creature_type_as_type() {
        let sb = Statblock::try_from(fields(&["Goblin", "1/4", "15", "Humanoid", "Small"])).unwrap();
        let v = serde_json::to_value(&sb).unwrap();
        assert_eq!(v["type"], "Humanoid");
        assert_eq!(v["challenge_rating"], "1/4");
    }
}
