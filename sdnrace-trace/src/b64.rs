//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Serde adapters that persist structured OpenFlow values as base64 of
//! their OpenFlow 1.0 byte representation, matching the on-disk trace
//! format.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serializer};

// Encodes a string payload to its base64 form.
pub fn encode<T: AsRef<[u8]>>(data: T) -> String {
    STANDARD.encode(data)
}

// Decodes a base64 payload.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

pub mod flow_mod {
    use sdnrace_utils::openflow::FlowMod;

    use serde::de::Error as _;

    use super::*;

    pub fn serialize<S>(value: &FlowMod, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(value.encode()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<FlowMod, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = String::deserialize(deserializer)?;
        let data = decode(&data).map_err(D::Error::custom)?;
        FlowMod::decode(&data).map_err(D::Error::custom)
    }
}

pub mod opt_flow_mod {
    use sdnrace_utils::openflow::FlowMod;

    use serde::de::Error as _;

    use super::*;

    pub fn serialize<S>(
        value: &Option<FlowMod>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&encode(value.encode())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<FlowMod>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = Option::<String>::deserialize(deserializer)?;
        match data {
            Some(data) => {
                let data = decode(&data).map_err(D::Error::custom)?;
                FlowMod::decode(&data).map(Some).map_err(D::Error::custom)
            }
            None => Ok(None),
        }
    }
}

pub mod flow_table {
    use sdnrace_utils::openflow::FlowTable;

    use serde::de::Error as _;

    use super::*;

    pub fn serialize<S>(
        value: &FlowTable,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(value.encode()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<FlowTable, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = String::deserialize(deserializer)?;
        let data = decode(&data).map_err(D::Error::custom)?;
        FlowTable::decode(&data).map_err(D::Error::custom)
    }
}
