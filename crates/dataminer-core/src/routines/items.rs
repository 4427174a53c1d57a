//! `Weapon Types.json` and `Item Types.json`.
//!
//! Only definitions some inventory balance actually spawns are written. A
//! balance names its definition directly, through its part list collection,
//! or both. When it does both, the two must agree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::{enum_label, require_class, sorted_paths, Node, RoutineError, RoutineResult};
use crate::dump::write_json;
use crate::engine::{ClassHandle, FieldValue, ObjectHandle, ReflectionEngine};

pub const WEAPON_TYPES_DUMP: &str = "Weapon Types.json";
pub const ITEM_TYPES_DUMP: &str = "Item Types.json";

const ITEM_DEFINITION: &str = "WillowGame.ItemDefinition";
const WEAPON_TYPE_DEFINITION: &str = "WillowGame.WeaponTypeDefinition";
const INVENTORY_BALANCE_DEFINITION: &str = "WillowGame.InventoryBalanceDefinition";
const ITEM_PART_LIST_COLLECTION: &str = "WillowGame.ItemPartListCollectionDefinition";
const WEAPON_PART_LIST_COLLECTION: &str = "WillowGame.WeaponPartListCollectionDefinition";

/// Base type of a weapon definition, from its `b*` type flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WeaponKind
{
    Pistol,
    Shotgun,
    #[serde(rename = "SMG")]
    Smg,
    SniperRifle,
    Blade,
    Discus,
    RocketLauncher,
    GrenadeLauncher,
    PlasmaWeapon,
    AssaultRifle,
    HeavyWeapon,
    ExtraWeapon1,
    ExtraWeapon2,
    ExtraWeapon3,
    ExtraWeapon4,
}

impl WeaponKind
{
    /// Every kind with the flag that marks it
    pub const FLAGS: [(&'static str, Self); 15] = [
        ("bPistol", Self::Pistol),
        ("bShotgun", Self::Shotgun),
        ("bSMG", Self::Smg),
        ("bSniperRifle", Self::SniperRifle),
        ("bBlade", Self::Blade),
        ("bDiscus", Self::Discus),
        ("bRocketLauncher", Self::RocketLauncher),
        ("bGrenadeLauncher", Self::GrenadeLauncher),
        ("bPlasmaWeapon", Self::PlasmaWeapon),
        ("bAssaultRifle", Self::AssaultRifle),
        ("bHeavyWeapon", Self::HeavyWeapon),
        ("bExtraWeapon1", Self::ExtraWeapon1),
        ("bExtraWeapon2", Self::ExtraWeapon2),
        ("bExtraWeapon3", Self::ExtraWeapon3),
        ("bExtraWeapon4", Self::ExtraWeapon4),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaponType
{
    #[serde(rename = "type")]
    pub kind: WeaponKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefixes: Option<Vec<String>>,
    #[serde(flatten)]
    pub parts: PartLists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemType
{
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub has_full_name: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_mission_item: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_required: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefixes: Option<Vec<String>>,
    #[serde(flatten)]
    pub parts: PartLists,
}

/// Part paths per slot, in slot order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartLists(pub Vec<(&'static str, Vec<String>)>);

impl PartLists
{
    /// Parts of the slot written as `key`
    pub fn get(&self, key: &str) -> Option<&[String]>
    {
        self.0.iter().find(|(slot, _)| *slot == key).map(|(_, parts)| parts.as_slice())
    }
}

impl Serialize for PartLists
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (slot, parts) in &self.0 {
            map.serialize_entry(slot, parts)?;
        }
        map.end()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes fields by reference
fn is_false(value: &bool) -> bool
{
    !*value
}

/// Part slots of a weapon type: (field, key written)
const WEAPON_PARTS: [(&str, &str); 9] = [
    ("BodyParts", "body_parts"),
    ("GripParts", "grip_parts"),
    ("MagazineParts", "magazine_parts"),
    ("BarrelParts", "barrel_parts"),
    ("SightParts", "sight_parts"),
    ("StockParts", "stock_parts"),
    ("ActionParts", "action_parts"),
    ("AccessoryParts", "accessory_parts"),
    ("MaterialParts", "material_parts"),
];

const ITEM_PARTS: [(&str, &str); 4] = [
    ("BodyParts", "body_parts"),
    ("LeftSideParts", "left_side_parts"),
    ("RightSideParts", "right_side_parts"),
    ("MaterialParts", "material_parts"),
];

/// Both dumps, keyed by definition path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory
{
    pub weapon_types: BTreeMap<String, WeaponType>,
    pub item_types: BTreeMap<String, ItemType>,
}

struct Classes
{
    item: ClassHandle,
    weapon_type: ClassHandle,
    item_parts: Option<ClassHandle>,
    weapon_parts: ClassHandle,
}

impl Classes
{
    fn part_list_kind<E: ReflectionEngine + ?Sized>(&self, engine: &E, part_list: &ObjectHandle) -> Option<&'static str>
    {
        if self.item_parts.is_some_and(|class| engine.is_a(part_list, &class)) {
            Some("AssociatedItem")
        } else if engine.is_a(part_list, &self.weapon_parts) {
            Some("AssociatedWeaponType")
        } else {
            None
        }
    }
}

/// Weapon and item types spawned by some inventory balance
///
/// ## Errors
///
/// - `MissingClass`: a definition or balance class isn't loaded
/// - `Inconsistent`: a balance and its part list name different definitions,
///   a definition is neither an item nor a weapon type, or a weapon type
///   doesn't set exactly one type flag
/// - `UnexpectedValue`: a field has the wrong shape
/// - `Engine`: reading the graph failed
pub fn collect_inventory<E: ReflectionEngine + ?Sized>(engine: &E) -> RoutineResult<Inventory>
{
    let classes = Classes {
        item: require_class(engine, ITEM_DEFINITION)?,
        weapon_type: require_class(engine, WEAPON_TYPE_DEFINITION)?,
        item_parts: engine.lookup_class(ITEM_PART_LIST_COLLECTION),
        weapon_parts: require_class(engine, WEAPON_PART_LIST_COLLECTION)?,
    };
    let balance_class = require_class(engine, INVENTORY_BALANCE_DEFINITION)?;

    let mut weapons = BTreeMap::new();
    let mut items = BTreeMap::new();
    for (path, balance) in engine.instances_of(&balance_class)? {
        let Some(definition) = balanced_definition(engine, &classes, &path, balance)? else {
            continue;
        };

        let definition_path = engine.object_path(&definition)?;
        if engine.is_a(&definition, &classes.item) {
            items.insert(definition_path, definition);
        } else if engine.is_a(&definition, &classes.weapon_type) {
            weapons.insert(definition_path, definition);
        } else {
            return Err(RoutineError::Inconsistent {
                owner: path,
                reason: format!("{definition_path} is neither an item nor a weapon type"),
            });
        }
    }

    let mut inventory = Inventory::default();
    for (path, weapon) in weapons {
        let weapon = read_weapon_type(engine, &Node::object(weapon, &path))?;
        inventory.weapon_types.insert(path, weapon);
    }
    for (path, item) in items {
        let item = read_item_type(engine, &Node::object(item, &path))?;
        inventory.item_types.insert(path, item);
    }

    tracing::info!(
        weapon_types = inventory.weapon_types.len(),
        item_types = inventory.item_types.len(),
        "Collected inventory definitions"
    );
    Ok(inventory)
}

/// Definition a balance spawns; `None` for balances that are skipped
fn balanced_definition<E: ReflectionEngine + ?Sized>(
    engine: &E,
    classes: &Classes,
    path: &str,
    balance: ObjectHandle,
) -> RoutineResult<Option<ObjectHandle>>
{
    let node = Node::object(balance, path);
    let definition = node.read_object(engine, "InventoryDefinition")?;
    let part_list = node.read_object(engine, "PartListCollection")?;

    match (definition, part_list) {
        (Some(definition), None) => Ok(Some(definition)),
        (Some(definition), Some(part_list)) => {
            let Some(field) = classes.part_list_kind(engine, &part_list) else {
                tracing::warn!(balance = %path, "Bad definition (part list mismatch)");
                return Ok(None);
            };
            let associated = Node::object(part_list, path).read_object(engine, field)?;
            if associated != Some(definition) {
                return Err(RoutineError::Inconsistent {
                    owner: path.to_string(),
                    reason: format!("part list {field} does not match the inventory definition"),
                });
            }
            Ok(Some(definition))
        }
        (None, Some(part_list)) => {
            let Some(field) = classes.part_list_kind(engine, &part_list) else {
                return Err(RoutineError::Inconsistent {
                    owner: path.to_string(),
                    reason: "part list collection is of an unsupported class".to_string(),
                });
            };
            let associated = Node::object(part_list, path).read_object(engine, field)?;
            associated.map(Some).ok_or_else(|| RoutineError::Inconsistent {
                owner: path.to_string(),
                reason: format!("part list has no {field}"),
            })
        }
        (None, None) => {
            tracing::warn!(balance = %path, "Bad definition (associated definition missing)");
            Ok(None)
        }
    }
}

fn read_weapon_type<E: ReflectionEngine + ?Sized>(engine: &E, weapon: &Node<'_>) -> RoutineResult<WeaponType>
{
    let mut kinds = Vec::new();
    for (flag, kind) in WeaponKind::FLAGS {
        if weapon.read_bool(engine, flag)? {
            kinds.push(kind);
        }
    }
    let [kind] = kinds.as_slice() else {
        return Err(RoutineError::Inconsistent {
            owner: weapon.owner().to_string(),
            reason: format!("expected exactly one weapon type flag, found {kinds:?}"),
        });
    };

    Ok(WeaponType {
        kind: *kind,
        name: weapon.read_string(engine, "TypeName")?,
        titles: reference_list(engine, weapon, "TitleList")?,
        prefixes: reference_list(engine, weapon, "PrefixList")?,
        parts: part_lists(engine, weapon, &WEAPON_PARTS)?,
    })
}

fn read_item_type<E: ReflectionEngine + ?Sized>(engine: &E, item: &Node<'_>) -> RoutineResult<ItemType>
{
    let name = item.read_string(engine, "ItemName")?;
    let requirement = item.read(engine, "RequiredCharacter")?;

    Ok(ItemType {
        name: (!name.is_empty()).then_some(name),
        has_full_name: item.read_bool(engine, "bItemNameIsFullName")?,
        is_mission_item: item.read_bool(engine, "bMissionItem")?,
        character_required: character_requirement(&requirement).map_err(|expected| RoutineError::UnexpectedValue {
            owner: item.owner().to_string(),
            field: "RequiredCharacter".to_string(),
            expected,
        })?,
        titles: reference_list(engine, item, "TitleList")?,
        prefixes: reference_list(engine, item, "PrefixList")?,
        parts: part_lists(engine, item, &ITEM_PARTS)?,
    })
}

/// Required character, or `None` when any character can use the item
fn character_requirement(value: &FieldValue) -> Result<Option<String>, &'static str>
{
    match value {
        FieldValue::Int(0) => Ok(None),
        FieldValue::Name(name) | FieldValue::String(name) if name.ends_with("None") => Ok(None),
        other => enum_label(other, &[]).map(Some).ok_or("an enumerated value"),
    }
}

/// Sorted non-null paths of an array of references; `None` if the array is empty
fn reference_list<E: ReflectionEngine + ?Sized>(engine: &E, node: &Node<'_>, field: &str) -> RoutineResult<Option<Vec<String>>>
{
    let values = node.read_array(engine, field)?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(sorted_paths(engine, &values, node.owner())?))
}

/// Weighted part paths of each slot that has any
fn part_lists<E: ReflectionEngine + ?Sized>(
    engine: &E,
    node: &Node<'_>,
    slots: &[(&str, &'static str)],
) -> RoutineResult<PartLists>
{
    let mut parts = Vec::new();
    for (field, key) in slots {
        let value = node.read(engine, field)?;
        let Some(slot) = Node::from_value(&value, node.owner())? else {
            continue;
        };

        let weighted = slot.read_array(engine, "WeightedParts")?;
        if weighted.is_empty() {
            continue;
        }
        let mut part_refs = Vec::with_capacity(weighted.len());
        for entry in &weighted {
            if let Some(entry) = Node::from_value(entry, node.owner())? {
                part_refs.push(FieldValue::Object(entry.read_object(engine, "Part")?));
            }
        }
        parts.push((*key, sorted_paths(engine, &part_refs, node.owner())?));
    }
    Ok(PartLists(parts))
}

/// Collect weapon and item types and write both dumps into `dir`
///
/// ## Errors
///
/// Whatever [`collect_inventory`] reports, or `Engine(Io)` if a dump
/// couldn't be written.
pub fn dump_items<E: ReflectionEngine + ?Sized>(engine: &E, dir: impl AsRef<Path>) -> RoutineResult<Vec<PathBuf>>
{
    let inventory = collect_inventory(engine)?;
    let dir = dir.as_ref();
    Ok(vec![
        write_json(dir, WEAPON_TYPES_DUMP, &inventory.weapon_types)?,
        write_json(dir, ITEM_TYPES_DUMP, &inventory.item_types)?,
    ])
}
