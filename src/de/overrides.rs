//! Custom-override decoders.
//!
//! An override gets first refusal on a record type before generic field
//! binding. The builtin set covers domain records whose wire layout is a
//! fixed field order rather than named headers, most of which embed
//! references to host catalogs by name. Those references are emitted as
//! unresolved [`CatalogRef`]s; resolving them is the host's business.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::deserializer::Deserializer;
use super::types::{Capability, Primitive, RecordSchema, TypeDesc, TypeKind, TypeRegistry};
use super::value::{Array, CatalogRef, Record, Value};
use crate::package::{VERSION_ATLAS_RAW_PIXELS, VERSION_LANE_PROP_UPGRADABLE, VERSION_PATH_LANE_FLAGS};
use crate::util::{Rect, Result};

/// Override decoder. `Ok(None)` declines and lets generic binding proceed.
pub type OverrideFn = dyn Fn(&mut Deserializer<'_>) -> Result<Option<Value>> + Send + Sync;

/// Canonical name of the string-to-bytes dictionary type.
pub const BYTE_DICTIONARY: &str = "Dictionary<string, byte[]>";

const BYTE_DICTIONARY_QUALIFIED: &str = "System.Collections.Generic.Dictionary`2[[System.String, mscorlib, \
    Version=2.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089],[System.Byte[], mscorlib, \
    Version=2.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089]]";

/// Override decoders keyed by canonical type name.
#[derive(Clone, Default)]
pub struct OverrideRegistry {
    map: HashMap<String, Arc<OverrideFn>>,
}

impl fmt::Debug for OverrideRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.map.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

impl OverrideRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The builtin domain decoders.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register("TransportInfo", |de| name_ref(de, "TransportInfo"));
        reg.register("ItemClass", |de| name_ref(de, "ItemClass"));
        reg.register("ManualMilestone", |de| name_ref(de, "Milestone"));
        reg.register("CombinedMilestone", |de| name_ref(de, "Milestone"));
        reg.register("NetInfo", |de| stripped_ref(de, "NetInfo"));
        reg.register("BuildingInfo", |de| stripped_ref(de, "BuildingInfo"));

        reg.register("BuildingInfo+Prop", building_prop);
        reg.register("PropInfo+Variation", |de| variation(de, "PropInfo+Variation", "m_prop", "PropInfo"));
        reg.register("TreeInfo+Variation", |de| variation(de, "TreeInfo+Variation", "m_tree", "TreeInfo"));
        reg.register("BuildingInfo+PathInfo", path_info);
        reg.register("MessageInfo", message_info);
        reg.register("ModInfo", mod_info);
        reg.register("DisasterProperties+DisasterSettings", disaster_settings);
        reg.register("UITextureAtlas", texture_atlas);
        reg.register("VehicleInfo+Effect", vehicle_effect);
        reg.register("VehicleInfo+VehicleDoor", vehicle_door);
        reg.register("VehicleInfo+VehicleTrailer", vehicle_trailer);
        reg.register("BuildingInfo+MeshInfo", building_mesh_info);
        reg.register("VehicleInfo+MeshInfo", vehicle_mesh_info);
        for flags in ["Building+Flags", "Vehicle+Flags", "VehicleParked+Flags"] {
            reg.register(flags, |de| Ok(Some(Value::I32(de.reader().read_i32()?))));
        }
        reg.register("DepotAI+SpawnPoint", spawn_point);
        reg.register("PropInfo+Effect", prop_effect);
        reg.register("BuildingInfo+SubInfo", building_sub_info);
        reg.register("PropInfo+ParkingSpace", parking_space);
        reg.register("PropInfo+SpecialPlace", special_place);
        reg.register("NetInfo+Lane", net_lane);
        reg.register("NetLaneProps", |de| Ok(Some(lane_props(de)?)));
        reg.register("NetLaneProps+Prop", |de| Ok(Some(lane_prop(de)?)));
        reg.register("NetInfo+Segment", net_segment);
        reg.register("NetInfo+Node", net_node);
        reg.register(BYTE_DICTIONARY, byte_dictionary);
        reg
    }

    /// Register or replace the decoder for a canonical type name.
    pub fn register<F>(&mut self, type_name: impl Into<String>, decode: F)
    where
        F: Fn(&mut Deserializer<'_>) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.map.insert(type_name.into(), Arc::new(decode));
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<OverrideFn>> {
        self.map.get(type_name).cloned()
    }

    pub fn remove(&mut self, type_name: &str) -> bool {
        self.map.remove(type_name).is_some()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.map.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Descriptors for every builtin override type.
pub(crate) fn register_types(reg: &mut TypeRegistry) {
    use Capability::{Plain, Scriptable};

    for name in ["TransportInfo", "ItemClass", "ManualMilestone", "CombinedMilestone", "NetInfo", "BuildingInfo"] {
        reg.register_record(RecordSchema::new(name, Scriptable));
    }
    reg.register_record(RecordSchema::new("AudioInfo", Scriptable));
    for flags in ["Building+Flags", "Vehicle+Flags", "VehicleParked+Flags"] {
        reg.register_enum(flags, Primitive::I32);
    }

    let records: &[(&str, Capability, &[(&str, &str)])] = &[
        (
            "BuildingInfo+Prop",
            Plain,
            &[
                ("m_prop", "PropInfo"),
                ("m_tree", "TreeInfo"),
                ("m_position", "Vector3"),
                ("m_angle", "float"),
                ("m_probability", "int"),
                ("m_fixedHeight", "bool"),
            ],
        ),
        ("PropInfo+Variation", Plain, &[("m_prop", "PropInfo"), ("m_probability", "int")]),
        ("TreeInfo+Variation", Plain, &[("m_tree", "TreeInfo"), ("m_probability", "int")]),
        (
            "BuildingInfo+PathInfo",
            Plain,
            &[
                ("m_netInfo", "NetInfo"),
                ("m_nodes", "Vector3[]"),
                ("m_curveTargets", "Vector3[]"),
                ("m_invertSegments", "bool"),
                ("m_maxSnapDistance", "float"),
                ("m_forbidLaneConnection", "bool[]"),
                ("m_trafficLights", "int[]"),
                ("m_yieldSigns", "bool[]"),
            ],
        ),
        (
            "MessageInfo",
            Plain,
            &[("m_firstID1", "string"), ("m_firstID2", "string"), ("m_repeatID1", "string"), ("m_repeatID2", "string")],
        ),
        ("ModInfo", Plain, &[("modName", "string"), ("modWorkshopID", "ulong")]),
        (
            "DisasterProperties+DisasterSettings",
            Plain,
            &[("m_disasterName", "string"), ("m_randomProbability", "int")],
        ),
        (
            "UITextureAtlas",
            Scriptable,
            &[("m_shader", "string"), ("m_padding", "int"), ("m_sprites", "UITextureAtlas+SpriteInfo[]")],
        ),
        ("UITextureAtlas+SpriteInfo", Plain, &[("name", "string")]),
        (
            "VehicleInfo+Effect",
            Plain,
            &[
                ("m_effect", "EffectInfo"),
                ("m_parkedFlagsForbidden", "VehicleParked+Flags"),
                ("m_parkedFlagsRequired", "VehicleParked+Flags"),
                ("m_vehicleFlagsForbidden", "Vehicle+Flags"),
                ("m_vehicleFlagsRequired", "Vehicle+Flags"),
            ],
        ),
        ("VehicleInfo+VehicleDoor", Plain, &[("m_type", "int"), ("m_location", "Vector3")]),
        (
            "VehicleInfo+VehicleTrailer",
            Plain,
            &[("m_info", "VehicleInfo"), ("m_probability", "int"), ("m_invertProbability", "int")],
        ),
        (
            "BuildingInfo+MeshInfo",
            Plain,
            &[
                ("m_subInfo", "GameObject"),
                ("m_flagsForbidden", "Building+Flags"),
                ("m_flagsRequired", "Building+Flags"),
                ("m_position", "Vector3"),
                ("m_angle", "float"),
            ],
        ),
        (
            "VehicleInfo+MeshInfo",
            Plain,
            &[
                ("m_subInfo", "GameObject"),
                ("m_vehicleFlagsForbidden", "Vehicle+Flags"),
                ("m_vehicleFlagsRequired", "Vehicle+Flags"),
                ("m_parkedFlagsForbidden", "VehicleParked+Flags"),
                ("m_parkedFlagsRequired", "VehicleParked+Flags"),
            ],
        ),
        ("DepotAI+SpawnPoint", Plain, &[("m_position", "Vector3"), ("m_target", "Vector3")]),
        (
            "PropInfo+Effect",
            Plain,
            &[("m_effect", "EffectInfo"), ("m_position", "Vector3"), ("m_direction", "Vector3")],
        ),
        (
            "BuildingInfo+SubInfo",
            Plain,
            &[("m_buildingInfo", "BuildingInfo"), ("m_position", "Vector3"), ("m_angle", "float"), ("m_fixedHeight", "bool")],
        ),
        (
            "PropInfo+ParkingSpace",
            Plain,
            &[("m_position", "Vector3"), ("m_direction", "Vector3"), ("m_size", "Vector3")],
        ),
        (
            "PropInfo+SpecialPlace",
            Plain,
            &[("m_specialFlags", "int"), ("m_position", "Vector3"), ("m_direction", "Vector3")],
        ),
        (
            "NetInfo+Lane",
            Plain,
            &[
                ("m_position", "float"),
                ("m_width", "float"),
                ("m_verticalOffset", "float"),
                ("m_stopOffset", "float"),
                ("m_speedLimit", "float"),
                ("m_direction", "int"),
                ("m_laneType", "int"),
                ("m_vehicleType", "int"),
                ("m_stopType", "int"),
                ("m_laneProps", "NetLaneProps"),
                ("m_allowConnect", "bool"),
                ("m_useTerrainHeight", "bool"),
                ("m_centerPlatform", "bool"),
                ("m_elevated", "bool"),
            ],
        ),
        ("NetLaneProps", Scriptable, &[("m_props", "NetLaneProps+Prop[]")]),
        (
            "NetLaneProps+Prop",
            Plain,
            &[
                ("m_flagsRequired", "int"),
                ("m_flagsForbidden", "int"),
                ("m_startFlagsRequired", "int"),
                ("m_startFlagsForbidden", "int"),
                ("m_endFlagsRequired", "int"),
                ("m_endFlagsForbidden", "int"),
                ("m_colorMode", "int"),
                ("m_prop", "PropInfo"),
                ("m_tree", "TreeInfo"),
                ("m_position", "Vector3"),
                ("m_angle", "float"),
                ("m_segmentOffset", "float"),
                ("m_repeatDistance", "float"),
                ("m_minLength", "float"),
                ("m_cornerAngle", "float"),
                ("m_probability", "int"),
                ("m_upgradable", "bool"),
            ],
        ),
        (
            "NetInfo+Segment",
            Plain,
            &[
                ("m_mesh", "Mesh"),
                ("m_material", "Material"),
                ("m_lodMesh", "Mesh"),
                ("m_lodMaterial", "Material"),
                ("m_forwardRequired", "int"),
                ("m_forwardForbidden", "int"),
                ("m_backwardRequired", "int"),
                ("m_backwardForbidden", "int"),
                ("m_emptyTransparent", "bool"),
                ("m_disableBendNodes", "bool"),
            ],
        ),
        (
            "NetInfo+Node",
            Plain,
            &[
                ("m_mesh", "Mesh"),
                ("m_material", "Material"),
                ("m_lodMesh", "Mesh"),
                ("m_lodMaterial", "Material"),
                ("m_flagsRequired", "int"),
                ("m_flagsForbidden", "int"),
                ("m_connectGroup", "int"),
                ("m_directConnect", "bool"),
                ("m_emptyTransparent", "bool"),
            ],
        ),
    ];
    for (name, capability, fields) in records {
        let schema = fields
            .iter()
            .fold(RecordSchema::new(*name, *capability), |s, (field, ty)| s.field(*field, *ty));
        reg.register_record(schema);
    }

    let dictionary = TypeKind::Record(Arc::new(RecordSchema::new(BYTE_DICTIONARY, Plain)));
    reg.register(TypeDesc::new(BYTE_DICTIONARY, dictionary), &[BYTE_DICTIONARY_QUALIFIED]);
}

/// Text after the last '.', or the whole name.
fn strip_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, tail)| tail)
}

fn catalog_ref(catalog: &'static str, name: String) -> Value {
    if name.is_empty() {
        Value::Null
    } else {
        CatalogRef::new(catalog, name).into()
    }
}

/// Reference to a catalog entry shipped in the package being decoded.
fn packaged_ref(de: &mut Deserializer<'_>, catalog: &'static str) -> Result<Value> {
    let name = de.reader().read_string()?;
    if name.is_empty() {
        return Ok(Value::Null);
    }
    Ok(CatalogRef::new(catalog, format!("{}.{}", de.package().name(), name)).into())
}

fn read_ref(de: &mut Deserializer<'_>, catalog: &'static str) -> Result<Value> {
    Ok(catalog_ref(catalog, de.reader().read_string()?))
}

fn name_ref(de: &mut Deserializer<'_>, catalog: &'static str) -> Result<Option<Value>> {
    Ok(Some(read_ref(de, catalog)?))
}

/// Package-qualified stripped name first, then the name as written.
fn stripped_ref(de: &mut Deserializer<'_>, catalog: &'static str) -> Result<Option<Value>> {
    let name = de.reader().read_string()?;
    if name.is_empty() {
        return Ok(Some(Value::Null));
    }
    let local = format!("{}.{}", de.package().name(), strip_name(&name));
    Ok(Some(CatalogRef::with_candidates(catalog, [local, name]).into()))
}

fn building_prop(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let prop = read_ref(de, "PropInfo")?;
    let tree = read_ref(de, "TreeInfo")?;
    let r = de.reader();
    let record = Record::new("BuildingInfo+Prop")
        .with("m_prop", prop)
        .with("m_tree", tree)
        .with("m_position", r.read_vec3()?)
        .with("m_angle", r.read_f32()?)
        .with("m_probability", r.read_i32()?)
        .with("m_fixedHeight", r.read_bool()?);
    Ok(Some(record.into()))
}

fn variation(
    de: &mut Deserializer<'_>,
    type_name: &str,
    field: &str,
    catalog: &'static str,
) -> Result<Option<Value>> {
    let target = packaged_ref(de, catalog)?;
    let probability = de.reader().read_i32()?;
    let record = Record::new(type_name).with(field, target).with("m_probability", probability);
    Ok(Some(record.into()))
}

fn path_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let net = read_ref(de, "NetInfo")?;
    let version = de.version();
    let r = de.reader();
    let mut record = Record::new("BuildingInfo+PathInfo")
        .with("m_netInfo", net)
        .with("m_nodes", Array::Vec3(r.read_vec3_array()?))
        .with("m_curveTargets", Array::Vec3(r.read_vec3_array()?))
        .with("m_invertSegments", r.read_bool()?)
        .with("m_maxSnapDistance", r.read_f32()?);
    if version >= VERSION_PATH_LANE_FLAGS {
        record = record
            .with("m_forbidLaneConnection", Array::Bool(r.read_bool_array()?))
            .with("m_trafficLights", Array::I32(r.read_i32_array()?))
            .with("m_yieldSigns", Array::Bool(r.read_bool_array()?));
    } else {
        record = record
            .with("m_forbidLaneConnection", Value::Null)
            .with("m_trafficLights", Value::Null)
            .with("m_yieldSigns", Value::Null);
    }
    Ok(Some(record.into()))
}

fn message_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let mut record = Record::new("MessageInfo");
    for field in ["m_firstID1", "m_firstID2", "m_repeatID1", "m_repeatID2"] {
        let id = de.reader().read_string()?;
        record = record.with(field, (!id.is_empty()).then_some(id));
    }
    Ok(Some(record.into()))
}

fn mod_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("ModInfo")
        .with("modName", r.read_string()?)
        .with("modWorkshopID", r.read_u64()?);
    Ok(Some(record.into()))
}

fn disaster_settings(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("DisasterProperties+DisasterSettings")
        .with("m_disasterName", r.read_string()?)
        .with("m_randomProbability", r.read_i32()?);
    Ok(Some(record.into()))
}

/// Atlas image (raw pixels in old packages, encoded bytes otherwise),
/// shader, padding and sprite regions.
fn texture_atlas(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let version = de.version();
    let r = de.reader();
    let mut record = Record::new("UITextureAtlas");
    record.name = Some(r.read_string()?);
    if version <= VERSION_ATLAS_RAW_PIXELS {
        record = record
            .with("m_width", r.read_i32()?)
            .with("m_height", r.read_i32()?)
            .with("m_pixels", Array::Color(r.read_color_array()?));
    } else {
        record = record.with("m_image", Array::U8(r.read_byte_array()?));
    }
    record = record.with("m_shader", r.read_string()?).with("m_padding", r.read_i32()?);

    let count = r.read_count()?;
    let mut sprites = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let region = Rect { x: r.read_f32()?, y: r.read_f32()?, width: r.read_f32()?, height: r.read_f32()? };
        let sprite = Record::new("UITextureAtlas+SpriteInfo")
            .with("name", r.read_string()?)
            .with("region", region);
        sprites.push(sprite.into());
    }
    Ok(Some(record.with("m_sprites", Array::Values(sprites)).into()))
}

fn vehicle_effect(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let effect = read_ref(de, "EffectInfo")?;
    let r = de.reader();
    let record = Record::new("VehicleInfo+Effect")
        .with("m_effect", effect)
        .with("m_parkedFlagsForbidden", r.read_i32()?)
        .with("m_parkedFlagsRequired", r.read_i32()?)
        .with("m_vehicleFlagsForbidden", r.read_i32()?)
        .with("m_vehicleFlagsRequired", r.read_i32()?);
    Ok(Some(record.into()))
}

fn vehicle_door(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("VehicleInfo+VehicleDoor")
        .with("m_type", r.read_i32()?)
        .with("m_location", r.read_vec3()?);
    Ok(Some(record.into()))
}

fn vehicle_trailer(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let info = packaged_ref(de, "VehicleInfo")?;
    let r = de.reader();
    let record = Record::new("VehicleInfo+VehicleTrailer")
        .with("m_info", info)
        .with("m_probability", r.read_i32()?)
        .with("m_invertProbability", r.read_i32()?);
    Ok(Some(record.into()))
}

/// Sub-object decoded from a node asset of the same package.
fn local_sub_info(de: &mut Deserializer<'_>) -> Result<Value> {
    let checksum = de.reader().read_string()?;
    de.instantiate_local(&checksum)
}

fn building_mesh_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let sub_info = local_sub_info(de)?;
    let r = de.reader();
    let record = Record::new("BuildingInfo+MeshInfo")
        .with("m_subInfo", sub_info)
        .with("m_flagsForbidden", r.read_i32()?)
        .with("m_flagsRequired", r.read_i32()?)
        .with("m_position", r.read_vec3()?)
        .with("m_angle", r.read_f32()?);
    Ok(Some(record.into()))
}

fn vehicle_mesh_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let sub_info = local_sub_info(de)?;
    let r = de.reader();
    let record = Record::new("VehicleInfo+MeshInfo")
        .with("m_subInfo", sub_info)
        .with("m_vehicleFlagsForbidden", r.read_i32()?)
        .with("m_vehicleFlagsRequired", r.read_i32()?)
        .with("m_parkedFlagsForbidden", r.read_i32()?)
        .with("m_parkedFlagsRequired", r.read_i32()?);
    Ok(Some(record.into()))
}

fn spawn_point(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("DepotAI+SpawnPoint")
        .with("m_position", r.read_vec3()?)
        .with("m_target", r.read_vec3()?);
    Ok(Some(record.into()))
}

fn prop_effect(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let effect = read_ref(de, "EffectInfo")?;
    let r = de.reader();
    let record = Record::new("PropInfo+Effect")
        .with("m_effect", effect)
        .with("m_position", r.read_vec3()?)
        .with("m_direction", r.read_vec3()?);
    Ok(Some(record.into()))
}

fn building_sub_info(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let name = de.reader().read_string()?;
    let building = if name.is_empty() {
        Value::Null
    } else {
        let local = format!("{}.{}", de.package().name(), name);
        CatalogRef::with_candidates("BuildingInfo", [local, name]).into()
    };
    let r = de.reader();
    let record = Record::new("BuildingInfo+SubInfo")
        .with("m_buildingInfo", building)
        .with("m_position", r.read_vec3()?)
        .with("m_angle", r.read_f32()?)
        .with("m_fixedHeight", r.read_bool()?);
    Ok(Some(record.into()))
}

fn parking_space(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("PropInfo+ParkingSpace")
        .with("m_position", r.read_vec3()?)
        .with("m_direction", r.read_vec3()?)
        .with("m_size", r.read_vec3()?);
    Ok(Some(record.into()))
}

fn special_place(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let record = Record::new("PropInfo+SpecialPlace")
        .with("m_specialFlags", r.read_i32()?)
        .with("m_position", r.read_vec3()?)
        .with("m_direction", r.read_vec3()?);
    Ok(Some(record.into()))
}

fn net_lane(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let mut record = Record::new("NetInfo+Lane");
    {
        let r = de.reader();
        for field in ["m_position", "m_width", "m_verticalOffset", "m_stopOffset", "m_speedLimit"] {
            record = record.with(field, r.read_f32()?);
        }
        for field in ["m_direction", "m_laneType", "m_vehicleType", "m_stopType"] {
            record = record.with(field, r.read_i32()?);
        }
    }
    record = record.with("m_laneProps", lane_props(de)?);
    let r = de.reader();
    for field in ["m_allowConnect", "m_useTerrainHeight", "m_centerPlatform", "m_elevated"] {
        record = record.with(field, r.read_bool()?);
    }
    Ok(Some(record.into()))
}

fn lane_props(de: &mut Deserializer<'_>) -> Result<Value> {
    let count = de.reader().read_count()?;
    let mut props = Vec::with_capacity(count.min(de.reader().remaining()));
    for _ in 0..count {
        props.push(lane_prop(de)?);
    }
    Ok(Record::new("NetLaneProps").with("m_props", Array::Values(props)).into())
}

/// Lane prop placement. Packages before the upgradable flag existed derive
/// it from the tree reference and repeat distance.
fn lane_prop(de: &mut Deserializer<'_>) -> Result<Value> {
    let mut record = Record::new("NetLaneProps+Prop");
    for field in [
        "m_flagsRequired",
        "m_flagsForbidden",
        "m_startFlagsRequired",
        "m_startFlagsForbidden",
        "m_endFlagsRequired",
        "m_endFlagsForbidden",
        "m_colorMode",
    ] {
        record = record.with(field, de.reader().read_i32()?);
    }
    let prop = read_ref(de, "PropInfo")?;
    let tree = read_ref(de, "TreeInfo")?;
    let has_tree = !tree.is_null();
    record = record.with("m_prop", prop).with("m_tree", tree);

    let version = de.version();
    let r = de.reader();
    record = record
        .with("m_position", r.read_vec3()?)
        .with("m_angle", r.read_f32()?)
        .with("m_segmentOffset", r.read_f32()?);
    let repeat_distance = r.read_f32()?;
    record = record
        .with("m_repeatDistance", repeat_distance)
        .with("m_minLength", r.read_f32()?)
        .with("m_cornerAngle", r.read_f32()?)
        .with("m_probability", r.read_i32()?);
    let upgradable = if version >= VERSION_LANE_PROP_UPGRADABLE {
        r.read_bool()?
    } else {
        has_tree && repeat_distance > 0.0
    };
    Ok(record.with("m_upgradable", upgradable).into())
}

/// Mesh, material and their LOD variants, shared by checksum.
fn net_geometry(de: &mut Deserializer<'_>, type_name: &str) -> Result<Record> {
    let r = de.reader();
    Ok(Record::new(type_name)
        .with("m_mesh", r.read_mesh(None)?)
        .with("m_material", r.read_material(None)?)
        .with("m_lodMesh", r.read_mesh(None)?)
        .with("m_lodMaterial", r.read_material(None)?))
}

fn net_segment(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let mut record = net_geometry(de, "NetInfo+Segment")?;
    let r = de.reader();
    for field in ["m_forwardRequired", "m_forwardForbidden", "m_backwardRequired", "m_backwardForbidden"] {
        record = record.with(field, r.read_i32()?);
    }
    let record = record
        .with("m_emptyTransparent", r.read_bool()?)
        .with("m_disableBendNodes", r.read_bool()?);
    Ok(Some(record.into()))
}

fn net_node(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let record = net_geometry(de, "NetInfo+Node")?;
    let r = de.reader();
    let record = record
        .with("m_flagsRequired", r.read_i32()?)
        .with("m_flagsForbidden", r.read_i32()?)
        .with("m_connectGroup", r.read_i32()?)
        .with("m_directConnect", r.read_bool()?)
        .with("m_emptyTransparent", r.read_bool()?);
    Ok(Some(record.into()))
}

/// Count, then per entry a key and a counted byte blob.
fn byte_dictionary(de: &mut Deserializer<'_>) -> Result<Option<Value>> {
    let r = de.reader();
    let count = r.read_count()?;
    let mut record = Record::new(BYTE_DICTIONARY);
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let key = r.read_string()?;
        let value: Value = Array::U8(r.read_byte_array()?).into();
        // A repeated key overwrites the earlier blob
        match slots.get(&key) {
            Some(&i) => record.fields[i].1 = value,
            None => {
                slots.insert(key.clone(), record.fields.len());
                record.fields.push((key, value));
            }
        }
    }
    Ok(Some(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LoadSession;
    use crate::package::Package;
    use crate::stream::{PackageReader, PackageWriter};
    use crate::util::Vec3;
    use std::io::Cursor;

    fn decode_as(type_name: &str, version: u16, w: &PackageWriter) -> (Value, usize) {
        let package = Package::builder("Pkg").version(version).build().unwrap();
        let session = LoadSession::new();
        let mut reader: PackageReader = session.reader(Cursor::new(w.as_bytes().to_vec())).unwrap();
        let ty = session.types().resolve(type_name).unwrap();
        let mut de = Deserializer::new(&package, &mut reader);
        let value = de.try_override(&ty).unwrap().unwrap();
        let remaining = de.reader().remaining();
        (value, remaining)
    }

    fn path_info_bytes(with_lane_flags: bool) -> PackageWriter {
        let mut w = PackageWriter::new();
        w.write_string("Basic Road")
            .write_pod_array(&[Vec3::ZERO, Vec3::X])
            .write_pod_array::<Vec3>(&[])
            .write_bool(true)
            .write_f32(2.5);
        if with_lane_flags {
            w.write_bool_array(&[true, false]).write_pod_array(&[1i32, 2]).write_bool_array(&[]);
        }
        w
    }

    #[test]
    fn test_builtin_types_have_descriptors() {
        let types = TypeRegistry::builtin();
        let overrides = OverrideRegistry::builtin();
        assert!(overrides.len() > 30);
        for name in overrides.map.keys() {
            let ty = types.get(name).unwrap_or_else(|| panic!("no descriptor for {}", name));
            assert_eq!(ty.name(), name.as_str());
        }
    }

    #[test]
    fn test_path_info_version_gate() {
        let (value, remaining) = decode_as("BuildingInfo+PathInfo", 5, &path_info_bytes(true));
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.get("m_netInfo"), Some(&CatalogRef::new("NetInfo", "Basic Road").into()));
        assert_eq!(record.get("m_trafficLights"), Some(&Array::I32(vec![1, 2]).into()));

        let (value, remaining) = decode_as("BuildingInfo+PathInfo", 4, &path_info_bytes(false));
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.get("m_maxSnapDistance").and_then(Value::as_f32), Some(2.5));
        assert!(record.get("m_forbidLaneConnection").unwrap().is_null());
    }

    fn lane_prop_bytes(tree: &str, repeat: f32, upgradable: Option<bool>) -> PackageWriter {
        let mut w = PackageWriter::new();
        for i in 0..7 {
            w.write_i32(i);
        }
        w.write_string("").write_string(tree).write_vec3(Vec3::Y);
        w.write_f32(90.0).write_f32(0.5).write_f32(repeat).write_f32(1.0).write_f32(0.0);
        w.write_i32(100);
        if let Some(flag) = upgradable {
            w.write_bool(flag);
        }
        w
    }

    #[test]
    fn test_lane_prop_upgradable() {
        let (value, remaining) = decode_as("NetLaneProps+Prop", 8, &lane_prop_bytes("", 0.0, Some(true)));
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.get("m_upgradable").and_then(Value::as_bool), Some(true));
        assert!(record.get("m_prop").unwrap().is_null());
        assert_eq!(record.get("m_colorMode").and_then(Value::as_i32), Some(6));

        let (value, _) = decode_as("NetLaneProps+Prop", 7, &lane_prop_bytes("Oak", 12.0, None));
        assert_eq!(value.as_record().unwrap().get("m_upgradable").and_then(Value::as_bool), Some(true));

        let (value, _) = decode_as("NetLaneProps+Prop", 7, &lane_prop_bytes("", 12.0, None));
        assert_eq!(value.as_record().unwrap().get("m_upgradable").and_then(Value::as_bool), Some(false));
    }

    #[test]
    fn test_atlas_layouts() {
        let mut old = PackageWriter::new();
        old.write_string("Atlas")
            .write_i32(1)
            .write_i32(1)
            .write_pod_array(&[crate::util::Color::WHITE])
            .write_string("UI/Default UI Shader")
            .write_i32(2)
            .write_i32(1)
            .write_f32(0.0)
            .write_f32(0.0)
            .write_f32(1.0)
            .write_f32(1.0)
            .write_string("icon");
        let (value, remaining) = decode_as("UITextureAtlas", 3, &old);
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.name.as_deref(), Some("Atlas"));
        assert_eq!(record.get("m_width").and_then(Value::as_i32), Some(1));
        let Some(Value::Array(Array::Values(sprites))) = record.get("m_sprites") else { panic!("no sprites") };
        let sprite = sprites[0].as_record().unwrap();
        assert_eq!(sprite.get("name").and_then(Value::as_str), Some("icon"));
        assert_eq!(
            sprite.get("region"),
            Some(&Value::Rect(Rect { x: 0.0, y: 0.0, width: 1.0, height: 1.0 }))
        );

        let mut new = PackageWriter::new();
        new.write_string("Atlas").write_byte_array(&[1, 2, 3]).write_string("s").write_i32(0).write_i32(0);
        let (value, remaining) = decode_as("UITextureAtlas", 4, &new);
        assert_eq!(remaining, 0);
        assert_eq!(value.as_record().unwrap().get("m_image"), Some(&Array::U8(vec![1, 2, 3]).into()));
    }

    #[test]
    fn test_message_info_empty_is_null() {
        let mut w = PackageWriter::new();
        w.write_string("CHIRP_A").write_string("").write_string("").write_string("CHIRP_B");
        let (value, _) = decode_as("MessageInfo", 8, &w);
        let record = value.as_record().unwrap();
        assert_eq!(record.get("m_firstID1").and_then(Value::as_str), Some("CHIRP_A"));
        assert!(record.get("m_firstID2").unwrap().is_null());
        assert_eq!(record.get("m_repeatID2").and_then(Value::as_str), Some("CHIRP_B"));
    }

    #[test]
    fn test_catalog_candidates() {
        let mut w = PackageWriter::new();
        w.write_string("1234.Highway Ramp_Data");
        let (value, _) = decode_as("NetInfo", 8, &w);
        let Value::Ref(r) = value else { panic!("not a reference") };
        assert_eq!(r.catalog, "NetInfo");
        assert_eq!(r.candidates.as_slice(), ["Pkg.Highway Ramp_Data", "1234.Highway Ramp_Data"]);

        let mut w = PackageWriter::new();
        w.write_string("Big Tree").write_i32(40);
        let (value, _) = decode_as("TreeInfo+Variation", 8, &w);
        let tree = value.as_record().unwrap().get("m_tree").cloned();
        assert_eq!(tree, Some(CatalogRef::new("TreeInfo", "Pkg.Big Tree").into()));
    }

    #[test]
    fn test_byte_dictionary() {
        let mut w = PackageWriter::new();
        w.write_i32(2).write_string("a").write_byte_array(&[1]).write_string("b").write_byte_array(&[]);
        let qualified = format!("{}, mscorlib", BYTE_DICTIONARY_QUALIFIED);
        let (value, remaining) = decode_as(&qualified, 8, &w);
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.get("a"), Some(&Array::U8(vec![1]).into()));
        assert_eq!(record.get("b"), Some(&Array::U8(vec![]).into()));
    }

    #[test]
    fn test_large_byte_dictionary_keeps_order_and_last_duplicate() {
        let mut w = PackageWriter::new();
        w.write_i32(5001);
        for i in 0..5000 {
            w.write_string(&format!("blob{}", i)).write_byte_array(&[(i % 251) as u8]);
        }
        w.write_string("blob7").write_byte_array(&[9, 9]);
        let (value, remaining) = decode_as(BYTE_DICTIONARY, 8, &w);
        assert_eq!(remaining, 0);
        let record = value.as_record().unwrap();
        assert_eq!(record.fields.len(), 5000);
        assert_eq!(record.fields[4999].0, "blob4999");
        assert_eq!(record.get("blob7"), Some(&Array::U8(vec![9, 9]).into()));
        assert_eq!(record.get("blob8"), Some(&Array::U8(vec![8]).into()));
    }

    #[test]
    fn test_registry_replace_and_remove() {
        let mut reg = OverrideRegistry::builtin();
        let before = reg.len();
        reg.register("ModInfo", |_| Ok(None));
        assert_eq!(reg.len(), before);
        assert!(reg.remove("ModInfo"));
        assert!(!reg.contains("ModInfo"));
        assert!(format!("{:?}", reg).contains("NetInfo+Lane"));
    }
}
