//! The scene description (ski) template.
//!
//! The ski file is an XML-like tree consumed verbatim by the external
//! simulator. The core never builds a DOM: all queries and mutations are
//! targeted text edits, so every untouched byte survives bit-exactly. Free
//! parameters appear as `[label:default]` markers inside attribute values and
//! are substituted per individual.

pub mod wavelengths;

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::ParameterVector;

/// A dust grid element written into the scene as one self-closing tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustGridSpec {
    /// Element name, e.g. `FileTreeDustGrid` or `CartesianDustGrid`
    pub grid_type: String,
    /// Attributes in writing order
    pub attributes: Vec<(String, String)>,
}

impl DustGridSpec {
    /// A grid loaded from a precomputed tree file.
    pub fn file_tree(filename: impl Into<String>) -> Self {
        DustGridSpec {
            grid_type: "FileTreeDustGrid".to_string(),
            attributes: vec![("filename".to_string(), filename.into())],
        }
    }

    pub fn is_file_tree(&self) -> bool {
        self.grid_type == "FileTreeDustGrid"
    }

    pub fn filename(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == "filename")
            .map(|(_, value)| value.as_str())
    }

    fn render(&self) -> String {
        let mut element = format!("<{}", self.grid_type);
        for (name, value) in &self.attributes {
            element.push_str(&format!(" {name}=\"{value}\""));
        }
        element.push_str("/>");
        element
    }
}

/// A labeled scene description.
#[derive(Debug, Clone)]
pub struct SceneTemplate {
    text: String,
}

impl SceneTemplate {
    pub fn from_text(text: impl Into<String>) -> Self {
        SceneTemplate { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(SceneTemplate {
            text: std::fs::read_to_string(path)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.text)?;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    // ---- queries ----------------------------------------------------------

    /// Free-parameter labels in document order, deduplicated.
    pub fn free_parameter_labels(&self) -> Vec<String> {
        let re = label_regex();
        let mut labels = Vec::new();
        for caps in re.captures_iter(&self.text) {
            let label = caps[1].to_string();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    /// Number of photon packages per wavelength.
    pub fn npackages(&self) -> Result<u64> {
        let value = self.attribute("numPackages")?;
        value
            .parse::<f64>()
            .map(|v| v as u64)
            .map_err(|_| Error::Scene(format!("malformed numPackages value '{value}'")))
    }

    pub fn set_npackages(&mut self, npackages: u64) -> Result<()> {
        self.set_attribute("numPackages", &npackages.to_string())
    }

    pub fn selfabsorption(&self) -> Result<bool> {
        Ok(self.attribute("selfAbsorption")? == "true")
    }

    pub fn set_selfabsorption(&mut self, enabled: bool) -> Result<()> {
        self.set_attribute("selfAbsorption", if enabled { "true" } else { "false" })
    }

    /// Whether the dust emissivity accounts for transiently heated grains.
    pub fn transient_heating(&self) -> Result<bool> {
        Ok(self.attribute("dustEmissivity")? == "Transient")
    }

    pub fn set_transient_heating(&mut self, enabled: bool) -> Result<()> {
        self.set_attribute("dustEmissivity", if enabled { "Transient" } else { "GreyBody" })
    }

    /// Name of the wavelength grid file, when a file grid is configured.
    pub fn wavelengths_filename(&self) -> Option<String> {
        let re = Regex::new(r#"<FileWavelengthGrid\b[^>]*\bfilename="([^"]*)""#).unwrap();
        re.captures(&self.text).map(|caps| caps[1].to_string())
    }

    pub fn set_wavelengths_filename(&mut self, filename: &str) -> Result<()> {
        let re = Regex::new(r#"(<FileWavelengthGrid\b[^>]*\bfilename=")[^"]*(")"#).unwrap();
        if !re.is_match(&self.text) {
            return Err(Error::Scene(
                "scene has no file wavelength grid".to_string(),
            ));
        }
        self.text = re
            .replace(&self.text, format!("${{1}}{filename}${{2}}"))
            .into_owned();
        Ok(())
    }

    /// Wavelength count: the row count of the file grid resolved against the
    /// input directory, or the inline `numWavelengths` attribute.
    pub fn nwavelengths(&self, input_dir: Option<&Path>) -> Result<u64> {
        if let Some(filename) = self.wavelengths_filename() {
            let dir = input_dir.ok_or_else(|| {
                Error::Scene(format!(
                    "wavelength file '{filename}' requires an input directory"
                ))
            })?;
            return wavelengths::count_wavelengths(&dir.join(filename));
        }
        let value = self.attribute("numWavelengths")?;
        value
            .parse()
            .map_err(|_| Error::Scene(format!("malformed numWavelengths value '{value}'")))
    }

    /// Dimension of the dust library discretization: 1, 2 or 3.
    pub fn dustlib_dimension(&self) -> u8 {
        if self.text.contains("<AllCellsDustLib") {
            3
        } else if self.text.contains("<Dim2DustLib") {
            2
        } else {
            1
        }
    }

    /// Dust cell count, when the scene declares one.
    pub fn ncells(&self) -> Option<u64> {
        self.attribute("numCells").ok()?.parse().ok()
    }

    pub fn uses_file_tree_grid(&self) -> bool {
        self.text.contains("<FileTreeDustGrid")
    }

    // ---- mutators ---------------------------------------------------------

    /// Replace the dust grid element with the given spec.
    pub fn set_dust_grid(&mut self, grid: &DustGridSpec) -> Result<()> {
        let re = Regex::new(r"<[A-Za-z]+DustGrid\b[^>]*/>").unwrap();
        if !re.is_match(&self.text) {
            return Err(Error::Scene("scene has no dust grid element".to_string()));
        }
        let rendered = grid.render();
        self.text = re.replace(&self.text, rendered.as_str()).into_owned();
        Ok(())
    }

    /// Produce a concrete scene by substituting every `[label:default]`
    /// marker with the individual's value for that label.
    pub fn substitute_labels(&self, values: &ParameterVector) -> Result<String> {
        let re = label_regex();
        let mut missing = Vec::new();
        let substituted = re
            .replace_all(&self.text, |caps: &regex::Captures<'_>| {
                let label = &caps[1];
                match values.get(label) {
                    Some(value) => value.to_string(),
                    None => {
                        missing.push(label.to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        if !missing.is_empty() {
            missing.dedup();
            return Err(Error::Configuration(format!(
                "no values for scene labels: {}",
                missing.join(", ")
            )));
        }
        Ok(substituted)
    }

    /// Default values carried by the label markers.
    pub fn label_defaults(&self) -> Result<BTreeMap<String, crate::units::Quantity>> {
        let re = label_regex();
        let mut defaults = BTreeMap::new();
        for caps in re.captures_iter(&self.text) {
            let label = caps[1].to_string();
            let value: crate::units::Quantity = caps[2].parse()?;
            defaults.entry(label).or_insert(value);
        }
        Ok(defaults)
    }

    // ---- helpers ----------------------------------------------------------

    fn attribute(&self, name: &str) -> Result<String> {
        let re = Regex::new(&format!(r#"\b{name}="([^"]*)""#)).unwrap();
        re.captures(&self.text)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| Error::Scene(format!("scene has no '{name}' attribute")))
    }

    fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let re = Regex::new(&format!(r#"(\b{name}=")[^"]*(")"#)).unwrap();
        if !re.is_match(&self.text) {
            return Err(Error::Scene(format!("scene has no '{name}' attribute")));
        }
        self.text = re
            .replace(&self.text, format!("${{1}}{value}${{2}}"))
            .into_owned();
        Ok(())
    }
}

fn label_regex() -> Regex {
    Regex::new(r"\[([A-Za-z_][A-Za-z0-9_]*):([^\]]*)\]").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Quantity, Unit};

    const SKI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<skirt-simulation-hierarchy type="MonteCarloSimulation">
  <PanMonteCarloSimulation numPackages="500000">
    <dustSystem>
      <PanDustSystem selfAbsorption="false" dustEmissivity="GreyBody" numCells="250000">
        <dustLib><AllCellsDustLib/></dustLib>
        <dustGrid><CartesianDustGrid writeGrid="false"/></dustGrid>
        <components>
          <DustComp dustMass="[dust_mass:3e7 Msun]"/>
        </components>
      </PanDustSystem>
    </dustSystem>
    <stellarSystem>
      <StellarComp luminosity="[fuv_young:1e15 W]" scale="[ionizing:0.3]"/>
    </stellarSystem>
    <wavelengthGrid>
      <FileWavelengthGrid filename="wavelengths_level3.dat"/>
    </wavelengthGrid>
  </PanMonteCarloSimulation>
</skirt-simulation-hierarchy>
"#;

    #[test]
    fn test_queries() {
        let scene = SceneTemplate::from_text(SKI);
        assert_eq!(scene.npackages().unwrap(), 500000);
        assert!(!scene.selfabsorption().unwrap());
        assert!(!scene.transient_heating().unwrap());
        assert_eq!(scene.dustlib_dimension(), 3);
        assert_eq!(scene.ncells(), Some(250000));
        assert_eq!(
            scene.wavelengths_filename().as_deref(),
            Some("wavelengths_level3.dat")
        );
        assert_eq!(
            scene.free_parameter_labels(),
            vec!["dust_mass", "fuv_young", "ionizing"]
        );
    }

    #[test]
    fn test_mutations_touch_only_their_target() {
        let mut scene = SceneTemplate::from_text(SKI);
        scene.set_npackages(1_000_000).unwrap();
        scene.set_selfabsorption(true).unwrap();
        scene.set_transient_heating(true).unwrap();
        scene.set_wavelengths_filename("wavelengths_level4.dat").unwrap();
        scene
            .set_dust_grid(&DustGridSpec::file_tree("tree_highres.dat"))
            .unwrap();

        assert_eq!(scene.npackages().unwrap(), 1_000_000);
        assert!(scene.selfabsorption().unwrap());
        assert!(scene.transient_heating().unwrap());
        assert!(scene.uses_file_tree_grid());
        // Everything else is preserved bit-exactly.
        assert!(scene.text().contains(r#"<DustComp dustMass="[dust_mass:3e7 Msun]"/>"#));
        assert!(scene.text().contains(r#"numCells="250000""#));
        assert!(scene.text().contains("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    }

    #[test]
    fn test_label_substitution() {
        let scene = SceneTemplate::from_text(SKI);
        let mut values = ParameterVector::new();
        values.push("dust_mass", Quantity::new(4.2e7, Unit::SolarMass));
        values.push("fuv_young", Quantity::new(2e15, Unit::Watt));
        values.push("ionizing", Quantity::dimensionless(0.5));
        let concrete = scene.substitute_labels(&values).unwrap();
        assert!(concrete.contains(r#"dustMass="42000000 Msun""#));
        assert!(concrete.contains(r#"luminosity="2000000000000000 W""#));
        assert!(concrete.contains(r#"scale="0.5""#));
        assert!(!concrete.contains('['));
    }

    #[test]
    fn test_substitution_missing_label_fails() {
        let scene = SceneTemplate::from_text(SKI);
        let mut values = ParameterVector::new();
        values.push("dust_mass", Quantity::new(4.2e7, Unit::SolarMass));
        assert!(matches!(
            scene.substitute_labels(&values),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_label_defaults() {
        let scene = SceneTemplate::from_text(SKI);
        let defaults = scene.label_defaults().unwrap();
        assert_eq!(defaults["dust_mass"].unit, Unit::SolarMass);
        assert_eq!(defaults["ionizing"].value, 0.3);
    }
}
