//! Renamed types, renamed members and known-but-unmapped types.

use super::types::{bare_name, Capability, RecordSchema, TypeRegistry};

/// Old bare type name to current bare type name.
const LEGACY_TYPES: &[(&str, &str)] = &[
    ("LoadSaveMapPanel+MapMetaData", "MapMetaData"),
    ("LoadSavePanelBase+MapMetaData", "MapMetaData"),
    ("LoadSavePanelBase+SystemMapMetaData", "SystemMapMetaData"),
    ("LoadSavePanelBase+SaveGameMetaData", "SaveGameMetaData"),
];

/// (owning type, old member) to current member.
const LEGACY_MEMBERS: &[(&str, &str, &str)] = &[
    ("MapMetaData", "saveRef", "assetRef"),
    ("SystemMapMetaData", "saveRef", "assetRef"),
    ("SaveGameMetaData", "saveRef", "assetRef"),
];

/// Types with no decoder whose payload size is fixed.
const SKIPPABLE_TYPES: &[(&str, usize)] = &[("UnlockManager+Milestone", 4)];

/// Rewrite a renamed type identifier, keeping its assembly qualifier.
pub fn resolve_legacy_type(identifier: &str) -> Option<String> {
    let bare = bare_name(identifier);
    let (_, current) = LEGACY_TYPES.iter().find(|(old, _)| *old == bare)?;
    Some(format!("{}{}", current, &identifier[bare.len()..]))
}

/// Current name of a renamed member, if the owning type renamed it.
pub fn resolve_legacy_member(owner: &str, member: &str) -> Option<&'static str> {
    LEGACY_MEMBERS
        .iter()
        .find(|(ty, old, _)| *ty == owner && *old == member)
        .map(|(_, _, current)| *current)
}

/// Byte count to skip for a known type that has no decoder.
pub fn unknown_type_skip(identifier: &str) -> Option<usize> {
    let bare = bare_name(identifier);
    SKIPPABLE_TYPES.iter().find(|(name, _)| *name == bare).map(|(_, n)| *n)
}

/// Metadata records that are bound field by field.
pub(crate) fn register_metadata_types(reg: &mut TypeRegistry) {
    reg.register_enum("CustomAssetMetaData+Type", super::Primitive::I32);
    reg.register_enum("ItemClass+Service", super::Primitive::I32);
    reg.register_enum("ItemClass+SubService", super::Primitive::I32);
    reg.register_enum("ItemClass+Level", super::Primitive::I32);

    reg.register_record(
        RecordSchema::new("MapMetaData", Capability::Plain)
            .field("mapName", "string")
            .field("mapThemeRef", "string")
            .field("environment", "string")
            .field("timeStamp", "DateTime")
            .field("imageRef", "Asset")
            .field("assetRef", "Asset")
            .field("steamTags", "string[]")
            .field("population", "uint")
            .field("cash", "long")
            .field("isPublished", "bool")
            .field("builtin", "bool")
            .field("mods", "ModInfo[]"),
    );
    reg.register_record(
        RecordSchema::new("SystemMapMetaData", Capability::Plain)
            .field("mapName", "string")
            .field("environment", "string")
            .field("timeStamp", "DateTime")
            .field("imageRef", "Asset")
            .field("assetRef", "Asset")
            .field("steamTags", "string[]")
            .field("builtin", "bool"),
    );
    reg.register_record(
        RecordSchema::new("SaveGameMetaData", Capability::Plain)
            .field("cityName", "string")
            .field("environment", "string")
            .field("timeStamp", "DateTime")
            .field("imageRef", "Asset")
            .field("assetRef", "Asset")
            .field("population", "uint")
            .field("cash", "long")
            .field("mods", "ModInfo[]"),
    );
    reg.register_record(
        RecordSchema::new("CustomAssetMetaData", Capability::Plain)
            .field("name", "string")
            .field("type", "CustomAssetMetaData+Type")
            .field("timeStamp", "DateTime")
            .field("guid", "string")
            .field("imageRef", "Asset")
            .field("assetRef", "Asset")
            .field("steamTags", "string[]")
            .field("service", "ItemClass+Service")
            .field("subService", "ItemClass+SubService")
            .field("level", "ItemClass+Level")
            .field("triangles", "int")
            .field("lodTriangles", "int")
            .field("mods", "ModInfo[]"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUALIFIER: &str = ", Assembly-CSharp, Version=0.0.0.0, Culture=neutral, PublicKeyToken=null";

    #[test]
    fn test_legacy_type_keeps_qualifier() {
        let old = format!("LoadSavePanelBase+SaveGameMetaData{}", QUALIFIER);
        assert_eq!(resolve_legacy_type(&old).unwrap(), format!("SaveGameMetaData{}", QUALIFIER));
        assert_eq!(resolve_legacy_type("LoadSaveMapPanel+MapMetaData").unwrap(), "MapMetaData");
        assert!(resolve_legacy_type("MapMetaData").is_none());
    }

    #[test]
    fn test_legacy_member() {
        assert_eq!(resolve_legacy_member("MapMetaData", "saveRef"), Some("assetRef"));
        assert_eq!(resolve_legacy_member("CustomAssetMetaData", "saveRef"), None);
    }

    #[test]
    fn test_skip_table() {
        let id = format!("UnlockManager+Milestone{}", QUALIFIER);
        assert_eq!(unknown_type_skip(&id), Some(4));
        assert_eq!(unknown_type_skip("Something+Else"), None);
    }
}
