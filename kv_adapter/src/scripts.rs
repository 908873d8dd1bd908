//! The Atomic Script Library: every multi-key mutation is one named
//! server-side script, embedded at compile time and cached by sha1
//! (EVALSHA) by the redis backend.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptName {
    CreateEntry,
    DeleteEntry,
    RenameEntry,
    WriteContent,
    MaterializeGhost,
    SetMode,
    SetOwner,
    SetTimes,
}

impl ScriptName {
    pub fn all() -> &'static [ScriptName] {
        &[
            ScriptName::CreateEntry,
            ScriptName::DeleteEntry,
            ScriptName::RenameEntry,
            ScriptName::WriteContent,
            ScriptName::MaterializeGhost,
            ScriptName::SetMode,
            ScriptName::SetOwner,
            ScriptName::SetTimes,
        ]
    }

    pub fn source(self) -> &'static str {
        match self {
            ScriptName::CreateEntry => include_str!("../scripts/create_entry.lua"),
            ScriptName::DeleteEntry => include_str!("../scripts/delete_entry.lua"),
            ScriptName::RenameEntry => include_str!("../scripts/rename_entry.lua"),
            ScriptName::WriteContent => include_str!("../scripts/write_content.lua"),
            ScriptName::MaterializeGhost => include_str!("../scripts/materialize_ghost.lua"),
            ScriptName::SetMode => include_str!("../scripts/set_mode.lua"),
            ScriptName::SetOwner => include_str!("../scripts/set_owner.lua"),
            ScriptName::SetTimes => include_str!("../scripts/set_times.lua"),
        }
    }
}

/// A typed scalar argument passed to a script's `ARGV`.
#[derive(Debug, Clone)]
pub enum ScriptArg<'a> {
    Int(i64),
    Str(&'a str),
}

impl<'a> From<i64> for ScriptArg<'a> {
    fn from(v: i64) -> Self {
        ScriptArg::Int(v)
    }
}

impl<'a> From<&'a str> for ScriptArg<'a> {
    fn from(v: &'a str) -> Self {
        ScriptArg::Str(v)
    }
}

impl<'a> ScriptArg<'a> {
    pub fn to_arg_string(&self) -> String {
        match self {
            ScriptArg::Int(i) => i.to_string(),
            ScriptArg::Str(s) => s.to_string(),
        }
    }
}
