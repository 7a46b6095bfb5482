use crate::error::ConfError;
use crate::reflect::{TypeInfo, Typed};
use indexmap::IndexMap;
use log::debug;
use std::any::TypeId;
use std::collections::HashMap;

/// One registered type and the alias written into its type tag.
#[derive(Debug, Clone)]
pub struct Registration {
    info: TypeInfo,
    alias: String,
}

impl Registration {
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Bidirectional map between compound types and their aliases.
///
/// Registrations iterate in the order they were made.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_type: IndexMap<TypeId, Registration>,
    by_alias: HashMap<String, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its declared alias, or its type path when it
    /// declares none.
    pub fn register<T: Typed>(&mut self) -> Result<&Registration, ConfError> {
        self.register_info(T::type_info(), None)
    }

    pub fn register_as<T: Typed>(&mut self, alias: &str) -> Result<&Registration, ConfError> {
        self.register_info(T::type_info(), Some(alias))
    }

    pub fn register_info(
        &mut self,
        info: TypeInfo,
        alias: Option<&str>,
    ) -> Result<&Registration, ConfError> {
        let Some(compound) = info.compound() else {
            return Err(ConfError::NotCompound {
                type_name: info.path().to_string(),
            });
        };
        let alias = alias
            .or(compound.alias)
            .unwrap_or(info.path())
            .to_string();

        if let Some(existing) = self.by_type.get(&info.id()) {
            if existing.alias != alias {
                return Err(ConfError::AliasConflict {
                    type_name: info.path().to_string(),
                    existing: existing.alias.clone(),
                    requested: alias,
                });
            }
        } else {
            if let Some(owner) = self.by_alias.get(&alias) {
                let owner = self
                    .by_type
                    .get(owner)
                    .map_or("<unknown>", |r| r.info.path());
                return Err(ConfError::AliasTaken {
                    alias,
                    owner: owner.to_string(),
                });
            }
            debug!("registered `{}` as `{}`", info.path(), alias);
            self.by_alias.insert(alias.clone(), info.id());
            self.by_type.insert(info.id(), Registration { info, alias });
        }

        Ok(&self.by_type[&info.id()])
    }

    pub fn is_registered(&self, id: TypeId) -> bool {
        self.by_type.contains_key(&id)
    }

    pub fn alias_of(&self, info: &TypeInfo) -> Result<&str, ConfError> {
        self.by_type
            .get(&info.id())
            .map(|r| r.alias.as_str())
            .ok_or_else(|| ConfError::UnregisteredType {
                type_name: info.path().to_string(),
            })
    }

    pub fn type_by_alias(&self, alias: &str) -> Option<TypeInfo> {
        self.by_alias
            .get(alias)
            .and_then(|id| self.by_type.get(id))
            .map(|r| r.info)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.by_type.values()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
