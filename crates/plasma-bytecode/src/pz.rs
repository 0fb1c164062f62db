//! `Pz`: the in-memory bytecode program under construction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use plasma_core::ids::{IdGen, PzdId, PziId, PzpId, PzsId};
use plasma_core::qname::QName;

use crate::data::PzData;
use crate::proc::PzProc;
use crate::struct_def::PzStruct;

/// The qualified name of a runtime-resolved import (§6: "a named import
/// resolved by the runtime").
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ImportName(pub QName);

/// A mapping from bytecode ids to their definitions: data entries, struct
/// layouts, procedures and runtime imports.
///
/// `Pz` owns its own id space, separate from `Core`'s (see
/// `plasma_core::ids::IdGen`'s doc comment) — bytecode entities and core
/// entities are never compared for identity across the two.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Pz {
    data: IndexMap<PzdId, PzData>,
    structs: IndexMap<PzsId, PzStruct>,
    procs: IndexMap<PzpId, PzProc>,
    imports: IndexMap<PziId, ImportName>,
    ids: IdGen,
}

impl Pz {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_data_id(&mut self) -> PzdId {
        PzdId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_struct_id(&mut self) -> PzsId {
        PzsId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_proc_id(&mut self) -> PzpId {
        PzpId::from_raw(self.ids.next_raw())
    }

    pub fn fresh_import_id(&mut self) -> PziId {
        PziId::from_raw(self.ids.next_raw())
    }

    pub fn insert_data(&mut self, id: PzdId, data: PzData) {
        self.data.insert(id, data);
    }

    pub fn insert_struct(&mut self, id: PzsId, s: PzStruct) {
        self.structs.insert(id, s);
    }

    pub fn insert_proc(&mut self, id: PzpId, p: PzProc) {
        self.procs.insert(id, p);
    }

    pub fn insert_import(&mut self, id: PziId, name: ImportName) {
        self.imports.insert(id, name);
    }

    pub fn data(&self, id: PzdId) -> Option<&PzData> {
        self.data.get(&id)
    }

    pub fn struct_def(&self, id: PzsId) -> Option<&PzStruct> {
        self.structs.get(&id)
    }

    pub fn proc(&self, id: PzpId) -> Option<&PzProc> {
        self.procs.get(&id)
    }

    pub fn proc_mut(&mut self, id: PzpId) -> Option<&mut PzProc> {
        self.procs.get_mut(&id)
    }

    pub fn import(&self, id: PziId) -> Option<&ImportName> {
        self.imports.get(&id)
    }

    pub fn procs(&self) -> impl Iterator<Item = (PzpId, &PzProc)> {
        self.procs.iter().map(|(id, p)| (*id, p))
    }

    pub fn data_entries(&self) -> impl Iterator<Item = (PzdId, &PzData)> {
        self.data.iter().map(|(id, d)| (*id, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::Width;

    #[test]
    fn fresh_ids_share_one_counter_space() {
        let mut pz = Pz::new();
        let d0 = pz.fresh_data_id();
        let s0 = pz.fresh_struct_id();
        assert_eq!(s0.as_u32(), d0.as_u32() + 1);
    }

    #[test]
    fn inserted_entries_round_trip() {
        let mut pz = Pz::new();
        let id = pz.fresh_data_id();
        pz.insert_data(id, PzData::Array(Width::W8, vec![1, 2, 0]));
        assert_eq!(pz.data(id), Some(&PzData::Array(Width::W8, vec![1, 2, 0])));
    }
}
