//! Tests for the extraction routines, run against an in-memory object graph

use std::collections::{BTreeMap, HashMap};
use std::fs;

use dataminer_core::engine::{ClassHandle, FieldValue, ObjectHandle, ReflectionEngine};
use dataminer_core::error::{DataminerError, DataminerResult};
use dataminer_core::routines::items::{collect_inventory, dump_items, WeaponKind, ITEM_TYPES_DUMP, WEAPON_TYPES_DUMP};
use dataminer_core::routines::outposts::{collect_outposts, dump_outposts, MissionDependencies};
use dataminer_core::routines::player_classes::{collect_player_classes, dump_player_classes, PLAYER_CLASSES_DUMP};
use dataminer_core::routines::RoutineError;
use dataminer_core::types::Address;

/// Objects with exact classes and named fields
#[derive(Default)]
struct ObjectGraph
{
    classes: HashMap<&'static str, ClassHandle>,
    objects: Vec<(ObjectHandle, String, &'static str, ClassHandle)>,
    fields: HashMap<(ObjectHandle, String), FieldValue>,
}

impl ObjectGraph
{
    fn with_classes(names: &[&'static str]) -> Self
    {
        let mut graph = Self::default();
        for (index, name) in names.iter().enumerate() {
            graph.classes.insert(*name, ClassHandle(Address::new(0x100 * (index as u64 + 1))));
        }
        graph
    }

    /// Add an object whose name is the last segment of its path
    fn add(&mut self, class: &str, path: &'static str) -> ObjectHandle
    {
        let handle = ObjectHandle(Address::new(0x10_0000 + 0x100 * self.objects.len() as u64));
        let name = path.rsplit('.').next().unwrap_or(path).to_string();
        self.objects.push((handle, name, path, self.classes[class]));
        handle
    }

    fn set(&mut self, object: ObjectHandle, field: &str, value: FieldValue)
    {
        self.fields.insert((object, field.to_string()), value);
    }

    fn entry(&self, object: &ObjectHandle) -> DataminerResult<&(ObjectHandle, String, &'static str, ClassHandle)>
    {
        self.objects
            .iter()
            .find(|entry| entry.0 == *object)
            .ok_or(DataminerError::MemoryAccess {
                address: object.address(),
                len: 0,
                reason: "not an object".to_string(),
            })
    }
}

impl ReflectionEngine for ObjectGraph
{
    fn lookup_class(&self, name: &str) -> Option<ClassHandle>
    {
        self.classes.get(name).copied()
    }

    fn lookup_path(&self, path: &str) -> Option<ObjectHandle>
    {
        self.objects.iter().find(|entry| entry.2 == path).map(|entry| entry.0)
    }

    fn lookup_objects(&self, predicate: &dyn Fn(&ObjectHandle) -> bool) -> Vec<ObjectHandle>
    {
        self.objects.iter().map(|entry| entry.0).filter(|object| predicate(object)).collect()
    }

    fn is_a(&self, object: &ObjectHandle, class: &ClassHandle) -> bool
    {
        self.entry(object).is_ok_and(|entry| entry.3 == *class)
    }

    fn object_name(&self, object: &ObjectHandle) -> DataminerResult<String>
    {
        Ok(self.entry(object)?.1.clone())
    }

    fn object_path(&self, object: &ObjectHandle) -> DataminerResult<String>
    {
        Ok(self.entry(object)?.2.to_string())
    }

    fn read_field(&self, object: &ObjectHandle, field: &str) -> DataminerResult<FieldValue>
    {
        self.fields
            .get(&(*object, field.to_string()))
            .cloned()
            .ok_or_else(|| DataminerError::EngineFailed(format!("no field {field}")))
    }
}

fn reference(object: ObjectHandle) -> FieldValue
{
    FieldValue::Object(Some(object))
}

fn text(value: &str) -> FieldValue
{
    FieldValue::String(value.to_string())
}

fn members(values: Vec<(&str, FieldValue)>) -> FieldValue
{
    FieldValue::Struct(values.into_iter().map(|(name, value)| (name.to_string(), value)).collect::<BTreeMap<_, _>>())
}

// Player classes

fn player_class_graph() -> ObjectGraph
{
    let mut graph = ObjectGraph::with_classes(&["WillowGame.PlayerClassDefinition"]);
    let soldier = graph.add("WillowGame.PlayerClassDefinition", "GD_Soldier.Character.CharClass_Soldier");
    let siren = graph.add("WillowGame.PlayerClassDefinition", "GD_Siren.Character.CharClass_Siren");
    graph.add("WillowGame.PlayerClassDefinition", "WillowGame.Default__PlayerClassDefinition");
    graph.set(soldier, "CharacterName", FieldValue::Name("Roland".to_string()));
    graph.set(siren, "CharacterName", FieldValue::Int(3));
    graph
}

#[test]
fn test_player_classes_keyed_by_path_without_defaults()
{
    let graph = player_class_graph();
    let classes = collect_player_classes(&graph).unwrap();

    let paths: Vec<&str> = classes.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        vec!["GD_Siren.Character.CharClass_Siren", "GD_Soldier.Character.CharClass_Soldier"]
    );
    assert_eq!(classes["GD_Soldier.Character.CharClass_Soldier"].name, "Roland");
    // Ordinals without a name are written as the number
    assert_eq!(classes["GD_Siren.Character.CharClass_Siren"].name, "3");
}

#[test]
fn test_player_classes_dump_file()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dump_player_classes(&player_class_graph(), dir.path()).unwrap();

    assert_eq!(path, dir.path().join(PLAYER_CLASSES_DUMP));
    let written = fs::read_to_string(path).unwrap();
    assert!(written.contains("  \"GD_Soldier.Character.CharClass_Soldier\": {\n    \"name\": \"Roland\"\n  }"));
}

#[test]
fn test_player_classes_need_their_class()
{
    let graph = ObjectGraph::with_classes(&["WillowGame.ItemDefinition"]);
    assert!(matches!(
        collect_player_classes(&graph),
        Err(RoutineError::MissingClass("WillowGame.PlayerClassDefinition"))
    ));
}

// Outposts

const LOOKUP: &str = "WillowGame.EmergencyTeleportOutpostLookup";
const GLOBALS: &str = "WillowGame.WillowGlobals";
const PACKAGE: &str = "WillowGame.DLCPackageDefinition";
const MISSION: &str = "WillowGame.MissionDefinition";

fn outpost(name: &str, extra: Vec<(&str, FieldValue)>) -> FieldValue
{
    let mut values = vec![
        ("OutpostName", FieldValue::Name(name.to_string())),
        ("OutpostPathName", text(&format!("Maps.{name}"))),
        ("bInitiallyActive", FieldValue::Bool(false)),
        ("bCheckpointOnly", FieldValue::Bool(false)),
        ("OutpostDisplayName", text("")),
        ("OutpostDescription", text("No Description")),
        ("PreviousOutpost", FieldValue::Name("None".to_string())),
        ("MissionDependencies", FieldValue::Array(Vec::new())),
    ];
    for (field, value) in extra {
        if let Some(slot) = values.iter_mut().find(|(existing, _)| *existing == field) {
            slot.1 = value;
        }
    }
    members(values)
}

/// Master list Fyrestone, AridHills, Headstone; a base lookup and a DLC lookup
fn outpost_graph() -> ObjectGraph
{
    let mut graph = ObjectGraph::with_classes(&[LOOKUP, GLOBALS, PACKAGE, MISSION]);

    let master = graph.add(LOOKUP, "GD_Globals.Outposts.MasterLookup");
    graph.set(
        master,
        "OutpostLookupList",
        FieldValue::Array(vec![
            members(vec![("OutpostName", FieldValue::Name("Fyrestone".to_string()))]),
            members(vec![("OutpostName", FieldValue::Name("AridHills".to_string()))]),
            members(vec![("OutpostName", FieldValue::Name("Headstone".to_string()))]),
        ]),
    );
    let globals = graph.add(GLOBALS, "Transient.WillowGlobals_0");
    graph.set(globals, "MasterRegistrationStationList", reference(master));
    graph.add(GLOBALS, "WillowGame.Default__WillowGlobals");

    let claptrap = graph.add(MISSION, "Z0_Missions.Missions.M_Claptrap");

    let base = graph.add(LOOKUP, "A_Base.Outposts.Lookup");
    graph.set(
        base,
        "OutpostLookupList",
        FieldValue::Array(vec![
            outpost(
                "AridHills",
                vec![
                    ("OutpostDisplayName", text("Arid Hills")),
                    ("PreviousOutpost", FieldValue::Name("Fyrestone".to_string())),
                    (
                        "MissionDependencies",
                        FieldValue::Array(vec![members(vec![
                            ("MissionDefinition", reference(claptrap)),
                            ("MissionStatus", FieldValue::Int(4)),
                        ])]),
                    ),
                ],
            ),
            outpost(
                "Fyrestone",
                vec![
                    ("bInitiallyActive", FieldValue::Bool(true)),
                    ("OutpostDescription", text("Home of the Catch-A-Ride")),
                ],
            ),
        ]),
    );

    let dlc = graph.add(LOOKUP, "Z_DLC.Outposts.Lookup");
    graph.set(
        dlc,
        "OutpostLookupList",
        FieldValue::Array(vec![
            outpost("Headstone", vec![("bCheckpointOnly", FieldValue::Bool(true))]),
            outpost("Fyrestone", Vec::new()),
        ]),
    );

    let package = graph.add(PACKAGE, "DLC3.Package");
    graph.set(package, "TeleportLookupObject", reference(dlc));
    let empty_package = graph.add(PACKAGE, "DLC1.Package");
    graph.set(empty_package, "TeleportLookupObject", FieldValue::Object(None));

    graph
}

#[test]
fn test_outposts_follow_master_order_and_skip_master_list()
{
    let graph = outpost_graph();
    let lookups = collect_outposts(&graph).unwrap();

    let paths: Vec<&str> = lookups.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["A_Base.Outposts.Lookup", "Z_DLC.Outposts.Lookup"]);

    let base = &lookups["A_Base.Outposts.Lookup"];
    assert_eq!(base.dlc_package, None);
    let names: Vec<(&str, usize)> = base.outposts.iter().map(|o| (o.name.as_str(), o.sort_order)).collect();
    assert_eq!(names, vec![("Fyrestone", 0), ("AridHills", 1)]);

    let fyrestone = &base.outposts[0];
    assert!(fyrestone.is_initially_active);
    assert_eq!(fyrestone.path, "Maps.Fyrestone");
    assert_eq!(fyrestone.description.as_deref(), Some("Home of the Catch-A-Ride"));
    assert_eq!(fyrestone.previous_outpost, None);
    assert_eq!(fyrestone.display_name, None);

    let arid = &base.outposts[1];
    assert_eq!(arid.display_name.as_deref(), Some("Arid Hills"));
    assert_eq!(arid.description, None);
    assert_eq!(arid.previous_outpost.as_deref(), Some("Fyrestone"));
    assert_eq!(
        arid.mission_dependencies,
        MissionDependencies(vec![("Z0_Missions.Missions.M_Claptrap".to_string(), "Complete".to_string())])
    );
}

#[test]
fn test_outposts_tag_dlc_lookup_and_drop_duplicates()
{
    let graph = outpost_graph();
    let lookups = collect_outposts(&graph).unwrap();

    let dlc = &lookups["Z_DLC.Outposts.Lookup"];
    assert_eq!(dlc.dlc_package.as_deref(), Some("DLC3.Package"));
    // Fyrestone was already written for the base lookup
    assert_eq!(dlc.outposts.len(), 1);
    assert_eq!(dlc.outposts[0].name, "Headstone");
    assert_eq!(dlc.outposts[0].sort_order, 2);
    assert!(dlc.outposts[0].is_checkpoint_only);
}

#[test]
fn test_outposts_dump_omits_unset_fields()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dump_outposts(&outpost_graph(), dir.path()).unwrap();
    let written = fs::read_to_string(path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();

    let fyrestone = &json["A_Base.Outposts.Lookup"]["outposts"][0];
    assert_eq!(fyrestone["is_initially_active"], true);
    assert!(fyrestone.get("is_checkpoint_only").is_none());
    assert!(fyrestone.get("mission_dependencies").is_none());
    assert!(json["A_Base.Outposts.Lookup"].get("dlc_package").is_none());
    assert_eq!(
        json["A_Base.Outposts.Lookup"]["outposts"][1]["mission_dependencies"]["Z0_Missions.Missions.M_Claptrap"],
        "Complete"
    );
    assert!(json.get("GD_Globals.Outposts.MasterLookup").is_none());
}

#[test]
fn test_outpost_missing_from_master_list_fails()
{
    let mut graph = outpost_graph();
    let stray = graph.add(LOOKUP, "M_Stray.Outposts.Lookup");
    graph.set(stray, "OutpostLookupList", FieldValue::Array(vec![outpost("Moxxi", Vec::new())]));

    match collect_outposts(&graph) {
        Err(RoutineError::Inconsistent { owner, reason }) => {
            assert_eq!(owner, "M_Stray.Outposts.Lookup");
            assert!(reason.contains("Moxxi"));
        }
        other => panic!("Expected Inconsistent, got {other:?}"),
    }
}

#[test]
fn test_outposts_need_exactly_one_globals_object()
{
    let mut graph = outpost_graph();
    graph.add(GLOBALS, "Transient.WillowGlobals_1");

    assert!(matches!(collect_outposts(&graph), Err(RoutineError::Inconsistent { .. })));
}

// Items

const ITEM: &str = "WillowGame.ItemDefinition";
const WEAPON_TYPE: &str = "WillowGame.WeaponTypeDefinition";
const BALANCE: &str = "WillowGame.InventoryBalanceDefinition";
const ITEM_PARTS: &str = "WillowGame.ItemPartListCollectionDefinition";
const WEAPON_PARTS: &str = "WillowGame.WeaponPartListCollectionDefinition";
const PART: &str = "WillowGame.WeaponPartDefinition";
const NAME_PART: &str = "WillowGame.WeaponNamePartDefinition";

fn weighted(parts: &[ObjectHandle]) -> FieldValue
{
    members(vec![(
        "WeightedParts",
        FieldValue::Array(parts.iter().map(|part| members(vec![("Part", reference(*part))])).collect()),
    )])
}

fn add_weapon_type(graph: &mut ObjectGraph, path: &'static str, flags: &[&str]) -> ObjectHandle
{
    let weapon = graph.add(WEAPON_TYPE, path);
    for (flag, _) in WeaponKind::FLAGS {
        graph.set(weapon, flag, FieldValue::Bool(flags.contains(&flag)));
    }
    graph.set(weapon, "TypeName", text("Repeater"));
    graph.set(weapon, "TitleList", FieldValue::Array(Vec::new()));
    graph.set(weapon, "PrefixList", FieldValue::Array(Vec::new()));
    for slot in [
        "BodyParts",
        "GripParts",
        "MagazineParts",
        "BarrelParts",
        "SightParts",
        "StockParts",
        "ActionParts",
        "AccessoryParts",
        "MaterialParts",
    ] {
        graph.set(weapon, slot, weighted(&[]));
    }
    weapon
}

fn add_item(graph: &mut ObjectGraph, path: &'static str, name: &str) -> ObjectHandle
{
    let item = graph.add(ITEM, path);
    graph.set(item, "ItemName", text(name));
    graph.set(item, "bItemNameIsFullName", FieldValue::Bool(false));
    graph.set(item, "bMissionItem", FieldValue::Bool(false));
    graph.set(item, "RequiredCharacter", FieldValue::Name("CR_None".to_string()));
    graph.set(item, "TitleList", FieldValue::Array(Vec::new()));
    graph.set(item, "PrefixList", FieldValue::Array(Vec::new()));
    for slot in ["BodyParts", "LeftSideParts", "RightSideParts", "MaterialParts"] {
        graph.set(item, slot, FieldValue::Object(None));
    }
    item
}

fn add_balance(graph: &mut ObjectGraph, path: &'static str, definition: Option<ObjectHandle>, part_list: Option<ObjectHandle>)
{
    let balance = graph.add(BALANCE, path);
    graph.set(balance, "InventoryDefinition", FieldValue::Object(definition));
    graph.set(balance, "PartListCollection", FieldValue::Object(part_list));
}

fn inventory_graph() -> ObjectGraph
{
    let mut graph = ObjectGraph::with_classes(&[ITEM, WEAPON_TYPE, BALANCE, ITEM_PARTS, WEAPON_PARTS, PART, NAME_PART]);

    let pistol = add_weapon_type(&mut graph, "GD_Weap_Pistol.A_Weapons.WT_Repeater", &["bPistol"]);
    let body_b = graph.add(PART, "GD_Weap_Pistol.Body.body2");
    let body_a = graph.add(PART, "GD_Weap_Pistol.Body.body1");
    let title_b = graph.add(NAME_PART, "GD_Weap_Pistol.Title.Title_Vengeance");
    let title_a = graph.add(NAME_PART, "GD_Weap_Pistol.Title.Title_Defender");
    graph.set(
        pistol,
        "TitleList",
        FieldValue::Array(vec![reference(title_b), FieldValue::Object(None), reference(title_a)]),
    );
    graph.set(pistol, "BodyParts", weighted(&[body_b, body_a]));
    let pistol_parts = graph.add(WEAPON_PARTS, "GD_Weap_Pistol.A_Weapons.WeaponParts_Repeater");
    graph.set(pistol_parts, "AssociatedWeaponType", reference(pistol));
    add_balance(&mut graph, "GD_Weap_Pistol.A_Weapons.Pistol_Balance", Some(pistol), Some(pistol_parts));
    // A second balance for the same weapon type
    add_balance(&mut graph, "GD_Weap_Pistol.A_Weapons.Pistol_Balance_Loot", Some(pistol), None);

    let sponge = add_item(&mut graph, "GD_Shields.A_Item.Shield_Sponge", "Sponge");
    graph.set(sponge, "bItemNameIsFullName", FieldValue::Bool(true));
    let capacitor = graph.add(PART, "GD_Shields.LeftSide.Capacitor");
    graph.set(sponge, "LeftSideParts", weighted(&[capacitor]));
    graph.set(sponge, "RightSideParts", weighted(&[]));
    let sponge_parts = graph.add(ITEM_PARTS, "GD_Shields.A_Item.ItemParts_Sponge");
    graph.set(sponge_parts, "AssociatedItem", reference(sponge));
    add_balance(&mut graph, "GD_Shields.A_Item.Sponge_Balance", None, Some(sponge_parts));

    let key = add_item(&mut graph, "GD_Mission.Items.Key", "");
    graph.set(key, "bMissionItem", FieldValue::Bool(true));
    graph.set(key, "RequiredCharacter", FieldValue::Int(2));
    add_balance(&mut graph, "GD_Mission.Items.Key_Balance", Some(key), None);

    // Skipped: nothing to spawn, and a part list of another kind
    add_balance(&mut graph, "GD_Broken.Empty_Balance", None, None);
    let stray_list = graph.add(PART, "GD_Broken.NotAPartList");
    add_balance(&mut graph, "GD_Broken.Odd_Balance", Some(key), Some(stray_list));

    graph
}

#[test]
fn test_weapon_types_reached_through_balances()
{
    let graph = inventory_graph();
    let inventory = collect_inventory(&graph).unwrap();

    assert_eq!(inventory.weapon_types.len(), 1);
    let pistol = &inventory.weapon_types["GD_Weap_Pistol.A_Weapons.WT_Repeater"];
    assert_eq!(pistol.kind, WeaponKind::Pistol);
    assert_eq!(pistol.name, "Repeater");
    assert_eq!(
        pistol.titles.as_deref(),
        Some(
            &[
                "GD_Weap_Pistol.Title.Title_Defender".to_string(),
                "GD_Weap_Pistol.Title.Title_Vengeance".to_string()
            ][..]
        )
    );
    assert_eq!(pistol.prefixes, None);
    assert_eq!(
        pistol.parts.get("body_parts"),
        Some(&["GD_Weap_Pistol.Body.body1".to_string(), "GD_Weap_Pistol.Body.body2".to_string()][..])
    );
    assert_eq!(pistol.parts.get("grip_parts"), None);
}

#[test]
fn test_item_types_reached_through_balances()
{
    let graph = inventory_graph();
    let inventory = collect_inventory(&graph).unwrap();

    let paths: Vec<&str> = inventory.item_types.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["GD_Mission.Items.Key", "GD_Shields.A_Item.Shield_Sponge"]);

    let sponge = &inventory.item_types["GD_Shields.A_Item.Shield_Sponge"];
    assert_eq!(sponge.name.as_deref(), Some("Sponge"));
    assert!(sponge.has_full_name);
    assert_eq!(sponge.character_required, None);
    assert_eq!(sponge.parts.get("left_side_parts"), Some(&["GD_Shields.LeftSide.Capacitor".to_string()][..]));
    assert_eq!(sponge.parts.get("right_side_parts"), None);
    assert_eq!(sponge.parts.get("body_parts"), None);

    let key = &inventory.item_types["GD_Mission.Items.Key"];
    assert_eq!(key.name, None);
    assert!(key.is_mission_item);
    assert_eq!(key.character_required.as_deref(), Some("2"));
}

#[test]
fn test_items_dump_writes_weapon_and_item_files()
{
    let dir = tempfile::tempdir().unwrap();
    let paths = dump_items(&inventory_graph(), dir.path()).unwrap();
    assert_eq!(paths, vec![dir.path().join(WEAPON_TYPES_DUMP), dir.path().join(ITEM_TYPES_DUMP)]);

    let weapons = fs::read_to_string(&paths[0]).unwrap();
    let weapons: serde_json::Value = serde_json::from_str(&weapons).unwrap();
    let pistol = &weapons["GD_Weap_Pistol.A_Weapons.WT_Repeater"];
    assert_eq!(pistol["type"], "Pistol");
    assert_eq!(pistol["body_parts"][0], "GD_Weap_Pistol.Body.body1");
    assert!(pistol.get("prefixes").is_none());

    let items = fs::read_to_string(&paths[1]).unwrap();
    let items: serde_json::Value = serde_json::from_str(&items).unwrap();
    assert_eq!(items["GD_Shields.A_Item.Shield_Sponge"]["has_full_name"], true);
    assert!(items["GD_Shields.A_Item.Shield_Sponge"].get("is_mission_item").is_none());
}

#[test]
fn test_smg_flag_is_written_as_smg()
{
    let mut graph = inventory_graph();
    let smg = add_weapon_type(&mut graph, "GD_Weap_SMG.A_Weapons.WT_SMG", &["bSMG"]);
    add_balance(&mut graph, "GD_Weap_SMG.A_Weapons.SMG_Balance", Some(smg), None);

    let inventory = collect_inventory(&graph).unwrap();
    let json = serde_json::to_value(&inventory.weapon_types["GD_Weap_SMG.A_Weapons.WT_SMG"]).unwrap();
    assert_eq!(json["type"], "SMG");
}

#[test]
fn test_weapon_type_with_two_flags_fails()
{
    let mut graph = inventory_graph();
    let odd = add_weapon_type(&mut graph, "GD_Weap_Odd.WT_Odd", &["bPistol", "bShotgun"]);
    add_balance(&mut graph, "GD_Weap_Odd.Odd_Balance", Some(odd), None);

    assert!(matches!(collect_inventory(&graph), Err(RoutineError::Inconsistent { owner, .. }) if owner == "GD_Weap_Odd.WT_Odd"));
}

#[test]
fn test_part_list_naming_another_definition_fails()
{
    let mut graph = inventory_graph();
    let first = add_item(&mut graph, "GD_Items.First", "First");
    let second = add_item(&mut graph, "GD_Items.Second", "Second");
    let parts = graph.add(ITEM_PARTS, "GD_Items.ItemParts_Second");
    graph.set(parts, "AssociatedItem", reference(second));
    add_balance(&mut graph, "GD_Items.First_Balance", Some(first), Some(parts));

    match collect_inventory(&graph) {
        Err(RoutineError::Inconsistent { owner, .. }) => assert_eq!(owner, "GD_Items.First_Balance"),
        other => panic!("Expected Inconsistent, got {other:?}"),
    }
}
