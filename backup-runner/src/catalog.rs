//! Backup catalog: the ordered list of targets for a run.
//!
//! Entries are checked once at load time so the rest of the pipeline can treat
//! them as well-formed.

use crate::config::TargetConfig;
use crate::utils::ConfigError;
use serde::Serialize;
use std::collections::HashSet;

/// One backup unit. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub source: String,
    pub archive: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

/// Desktop application and user data folders, relative to the home directory.
const BUILTIN: &[(&str, &str, &str)] = &[
    ("Dwarf Fortress (Snap)", "snap/dwarffortress", "DwarfFortressSnap"),
    ("GIMP (Flatpak)", ".var/app/org.gimp.GIMP", "GIMPFlatpakBackup"),
    ("GNOME Calculator (Flatpak)", ".var/app/org.gnome.Calculator", "GNOMECalculatorFlatpakBackup"),
    ("GNOME Calendar (Flatpak)", ".var/app/org.gnome.Calendar", "GNOMECalendarFlatpakBackup"),
    ("GNOME Clocks (Flatpak)", ".var/app/org.gnome.clocks", "GNOMEClocksFlatpakBackup"),
    ("GNOME Contacts (Flatpak)", ".var/app/org.gnome.Contacts", "GNOMEContactsFlatpakBackup"),
    ("Evince (Flatpak)", ".var/app/org.gnome.Evince", "EvinceFlatpakBackup"),
    ("Evolution (Flatpak)", ".var/app/org.gnome.Evolution", "EvolutionFlatpakBackup"),
    ("Firefox (Flatpak)", ".var/app/org.mozilla.firefox", "FirefoxFlatpakBackup"),
    ("GEdit (Flatpak)", ".var/app/org.gnome.gedit", "GEditFlatpakBackup"),
    ("Inkscape (Flatpak)", ".var/app/org.inkscape.Inkscape", "InkscapeFlatpakBackup"),
    ("LibreOffice (Flatpak)", ".var/app/org.libreoffice.LibreOffice", "LibreofficeFlatpakBackup"),
    ("Minecraft", ".minecraft", "Minecraft"),
    ("MultiMC", ".local/share/multimc", "MultiMCBackup"),
    ("Notes", "Documents/Notes", "NotesBackup"),
    ("Notes-Up", ".local/share/notes-up", "NotesUpData"),
    ("Pictures", "Pictures", "Pictures"),
    ("R Libraries", "R", "RLibraries"),
    ("Ren'Py", ".renpy", "RenPySaveData"),
    ("RetroArch (Snap)", "snap/retroarch", "RetroArchSnap"),
    ("ScummVM", ".local/share/scummvm", "ScummVMBackup"),
    ("ScummVM (Flatpak)", ".var/app/org.scummvm.ScummVM", "ScummVMFlatpakBackup"),
    ("SSH Keys", ".ssh", "SSHKeys"),
    ("Templates", "Templates", "Templates"),
    ("Visual Studio Code (Flatpak)", ".var/app/com.visualstudio.code", "VSCodeFlatpakBackup"),
    ("Visual Studio Code (Extensions)", ".vscode", "VSCodeExtensions"),
    ("Visual Studio Code (Configuration)", ".config/Code", "VSCodeConfiguration"),
    ("VLC (Flatpak)", ".var/app/org.videolan.VLC", "VLCFlatpakBackup"),
    ("Workspace", "Documents/Workspace", "WorkspaceBackup"),
];

impl Catalog {
    /// Build a catalog from configured targets, rejecting malformed entries.
    ///
    /// An empty target list selects the built-in catalog.
    pub fn from_targets(targets: &[TargetConfig]) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Ok(Self::builtin());
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(targets.len());

        for target in targets {
            check_target(target)?;
            if !seen.insert(target.archive.as_str()) {
                return Err(ConfigError::DuplicateArchive(target.archive.clone()));
            }
            entries.push(CatalogEntry {
                name: target.name.clone(),
                source: target.source.clone(),
                archive: target.archive.clone(),
            });
        }

        Ok(Self { entries })
    }

    /// The built-in desktop catalog.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(name, source, archive)| CatalogEntry {
                name: name.to_string(),
                source: source.to_string(),
                archive: archive.to_string(),
            })
            .collect();
        Self { entries }
    }

    /// The built-in catalog in configuration-file form.
    pub fn builtin_targets() -> Vec<TargetConfig> {
        BUILTIN
            .iter()
            .map(|(name, source, archive)| TargetConfig {
                name: name.to_string(),
                source: source.to_string(),
                archive: archive.to_string(),
            })
            .collect()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_target(target: &TargetConfig) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTarget {
        name: target.name.clone(),
        reason: reason.to_string(),
    };

    if target.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if target.source.trim().is_empty() {
        return Err(invalid("source is empty"));
    }
    if target.archive.is_empty() {
        return Err(invalid("archive base name is empty"));
    }
    if target.archive.starts_with('.') {
        return Err(invalid("archive base name must not start with '.'"));
    }
    if target
        .archive
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\n' || c == '\0')
    {
        return Err(invalid("archive base name must be a plain file name"));
    }

    Ok(())
}
