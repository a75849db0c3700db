//! Integration tests for checksum-keyed sharing of textures, meshes and materials.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assetpack::core::{LoadSession, LoaderSettings, SharedKind};
use assetpack::de::{Component, MaterialProperty, SharedRef, Value};
use assetpack::package::{
    Asset, AssetType, DecodedObject, NativeMaterializer, Package, PackageRegistry, SharedObject,
};
use assetpack::stream::PackageWriter;
use assetpack::util::{Color, Result};

/// Materializer that counts how often it runs.
#[derive(Default)]
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl NativeMaterializer for Counting {
    fn materialize(&self, _kind: SharedKind, _asset: &Asset, decoded: Value) -> Result<SharedObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(DecodedObject::new(decoded)))
    }
}

fn texture(name: &str) -> Vec<u8> {
    let mut w = PackageWriter::new();
    w.write_header("UnityEngine.Texture2D")
        .write_string(name)
        .write_bool(false)
        .write_i32(1)
        .write_byte_array(&[0xff; 8]);
    w.into_bytes()
}

fn material(texture_checksum: &str) -> Vec<u8> {
    let mut w = PackageWriter::new();
    w.write_header("UnityEngine.Material")
        .write_string("wall")
        .write_string("Custom/Buildings/Building/Default")
        .write_i32(2)
        .write_i32(0)
        .write_string("_Color")
        .write_color(Color::WHITE)
        .write_i32(3)
        .write_string("_MainTex")
        .write_bool(false)
        .write_string(texture_checksum);
    w.into_bytes()
}

/// A node with a renderer that uses the given material twice.
fn node(name: &str, material_checksum: &str) -> Vec<u8> {
    let mut w = PackageWriter::new();
    w.write_header("UnityEngine.GameObject")
        .write_string(name)
        .write_string("")
        .write_i32(0)
        .write_bool(true)
        .write_i32(1)
        .write_header("UnityEngine.MeshRenderer")
        .write_i32(2)
        .write_string(material_checksum)
        .write_string(material_checksum);
    w.into_bytes()
}

fn package() -> Package {
    Package::builder("Building")
        .main_asset("A")
        .asset("A", "node-a", AssetType::Object, node("A", "mat"))
        .asset("B", "node-b", AssetType::Object, node("B", "mat"))
        .asset("wall", "mat", AssetType::Material, material("tex"))
        .asset("diffuse", "tex", AssetType::Texture, texture("diffuse"))
        .build()
        .expect("Failed to build package")
}

fn renderer_materials(value: &Value) -> Vec<SharedRef> {
    let node = value.as_node().expect("not a node");
    match &node.components[0] {
        Component::MeshRenderer { materials } => materials.iter().map(|m| m.clone().expect("null material")).collect(),
        other => panic!("unexpected component {:?}", other),
    }
}

fn session(settings: LoaderSettings, calls: &Arc<AtomicUsize>) -> LoadSession {
    LoadSession::builder()
        .settings(settings)
        .materializer(Counting { calls: calls.clone() })
        .build()
}

#[test]
fn test_sharing_enabled_reuses_objects() {
    let pkg = package();
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(LoaderSettings::sharing_all(), &calls);

    let a = session.instantiate(&pkg.find("A").unwrap()).unwrap();
    let b = session.instantiate(&pkg.find("B").unwrap()).unwrap();
    let a = renderer_materials(&a);
    let b = renderer_materials(&b);

    assert!(a[0].same_object(&a[1]));
    assert!(a[0].same_object(&b[0]));
    // One material plus the texture it references
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.stats().shared_hits, 3);
}

#[test]
fn test_sharing_disabled_materializes_each_read() {
    let pkg = package();
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(LoaderSettings::default(), &calls);

    let a = session.instantiate(&pkg.find("A").unwrap()).unwrap();
    let a = renderer_materials(&a);
    assert!(!a[0].same_object(&a[1]));
    assert_eq!(a[0].checksum, a[1].checksum);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(session.stats().shared_hits, 0);
}

#[test]
fn test_sharing_per_kind() {
    let pkg = package();
    let calls = Arc::new(AtomicUsize::new(0));
    let settings = LoaderSettings { share_textures: true, ..LoaderSettings::default() };
    let session = session(settings, &calls);

    let a = session.instantiate(&pkg.find("A").unwrap()).unwrap();
    let a = renderer_materials(&a);
    assert!(!a[0].same_object(&a[1]));

    // Both materials point at the one shared texture
    let texture_of = |m: &SharedRef| {
        let decoded = m.object.as_any().downcast_ref::<DecodedObject>().unwrap();
        let Value::Material(material) = decoded.value() else { panic!("not a material") };
        match &material.properties[1].1 {
            MaterialProperty::Texture(Some(t)) => t.clone(),
            other => panic!("unexpected {:?}", other),
        }
    };
    assert!(texture_of(&a[0]).same_object(&texture_of(&a[1])));
}

#[test]
fn test_cross_package_resolution() {
    let library = Package::builder("Library")
        .asset("diffuse", "tex", AssetType::Texture, texture("library diffuse"))
        .build()
        .unwrap();
    let building = Package::builder("Building")
        .asset("wall", "mat", AssetType::Material, material("tex"))
        .build()
        .unwrap();
    let registry = Arc::new(PackageRegistry::new());
    registry.add(library.clone());

    let session = LoadSession::builder().resolver(registry.clone()).build();
    let value = session.instantiate(&building.find("wall").unwrap()).unwrap();
    let Value::Material(m) = value else { panic!("not a material") };
    let MaterialProperty::Texture(Some(t)) = &m.properties[1].1 else { panic!("texture not resolved") };
    let decoded = t.object.as_any().downcast_ref::<DecodedObject>().unwrap();
    let Value::Texture(tex) = decoded.value() else { panic!("not a texture") };
    assert_eq!(tex.name, "library diffuse");

    // Without the library the reference degrades to null
    registry.remove("Library");
    let session = LoadSession::builder().resolver(registry).build();
    let value = session.instantiate(&building.find("wall").unwrap()).unwrap();
    let Value::Material(m) = value else { panic!("not a material") };
    assert_eq!(m.properties[1].1, MaterialProperty::Texture(None));
    assert_eq!(session.stats().resolution_misses, 1);
}

#[test]
fn test_close_invalidates_shared_objects() {
    let pkg = package();
    let session = LoadSession::builder().settings(LoaderSettings::sharing_all()).build();
    let first = session.shared(SharedKind::Material, "mat", Some(&pkg)).unwrap().unwrap();
    session.close();
    let second = session.shared(SharedKind::Material, "mat", Some(&pkg)).unwrap().unwrap();
    assert!(!first.same_object(&second));
}
