//! In-memory dataset store, insertion-ordered. Used by tests and as the
//! live store behind a mounted snapshot.

use super::{AttrValue, DatasetError, DatasetResult, DatasetStore};

#[derive(Clone, Debug)]
struct Dimension {
    name: String,
    size: usize,
}

#[derive(Clone, Debug)]
struct Variable {
    name: String,
    dimensions: Vec<String>,
    data: Vec<f64>,
    attributes: Vec<(String, AttrValue)>,
}

#[derive(Default)]
pub struct InMemoryDataset {
    dimensions: Vec<Dimension>,
    variables: Vec<Variable>,
    attributes: Vec<(String, AttrValue)>,
    revision: u64,
}

fn validate_name(name: &str) -> DatasetResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\n')
    {
        return Err(DatasetError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn var(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    fn var_mut(&mut self, name: &str) -> DatasetResult<&mut Variable> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| DatasetError::NoSuchVariable(name.to_string()))
    }

    fn shape_len(&self, dimensions: &[String]) -> usize {
        dimensions
            .iter()
            .map(|d| {
                self.dimensions
                    .iter()
                    .find(|dim| dim.name == *d)
                    .map_or(0, |dim| dim.size)
            })
            .product()
    }

    /// Replace a variable's contents. Fixture/loader helper; not part of the
    /// engine-facing trait because the filesystem never writes array data.
    pub fn set_variable_data(&mut self, name: &str, data: Vec<f64>) -> DatasetResult<()> {
        let want = {
            let var = self
                .var(name)
                .ok_or_else(|| DatasetError::NoSuchVariable(name.to_string()))?;
            self.shape_len(&var.dimensions)
        };
        if data.len() != want {
            return Err(DatasetError::ShapeMismatch {
                want,
                got: data.len(),
            });
        }
        self.var_mut(name)?.data = data;
        self.bump();
        Ok(())
    }
}

impl DatasetStore for InMemoryDataset {
    fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.var(name).is_some()
    }

    fn variable_dimensions(&self, name: &str) -> Option<Vec<String>> {
        self.var(name).map(|v| v.dimensions.clone())
    }

    fn variable_data(&self, name: &str) -> Option<Vec<f64>> {
        self.var(name).map(|v| v.data.clone())
    }

    fn create_variable(&mut self, name: &str, dimensions: &[&str]) -> DatasetResult<()> {
        validate_name(name)?;
        if self.has_variable(name) {
            return Err(DatasetError::NameInUse(name.to_string()));
        }
        for dim in dimensions {
            if !self.has_dimension(dim) {
                return Err(DatasetError::NoSuchDimension(dim.to_string()));
            }
        }
        let dimensions: Vec<String> = dimensions.iter().map(|d| d.to_string()).collect();
        let len = self.shape_len(&dimensions);
        self.variables.push(Variable {
            name: name.to_string(),
            dimensions,
            data: vec![0.0; len],
            attributes: Vec::new(),
        });
        self.bump();
        Ok(())
    }

    fn rename_variable(&mut self, old: &str, new: &str) -> DatasetResult<()> {
        validate_name(new)?;
        if old != new && self.has_variable(new) {
            return Err(DatasetError::NameInUse(new.to_string()));
        }
        self.var_mut(old)?.name = new.to_string();
        self.bump();
        Ok(())
    }

    fn variable_attr_names(&self, name: &str) -> Option<Vec<String>> {
        self.var(name)
            .map(|v| v.attributes.iter().map(|(n, _)| n.clone()).collect())
    }

    fn variable_attr(&self, name: &str, attr: &str) -> Option<AttrValue> {
        self.var(name)?
            .attributes
            .iter()
            .find(|(n, _)| n == attr)
            .map(|(_, v)| v.clone())
    }

    fn set_variable_attr(&mut self, name: &str, attr: &str, value: AttrValue) -> DatasetResult<()> {
        validate_name(attr)?;
        let var = self.var_mut(name)?;
        match var.attributes.iter_mut().find(|(n, _)| n == attr) {
            Some((_, v)) => *v = value,
            None => var.attributes.push((attr.to_string(), value)),
        }
        self.bump();
        Ok(())
    }

    fn remove_variable_attr(&mut self, name: &str, attr: &str) -> DatasetResult<()> {
        let var = self.var_mut(name)?;
        let idx = var
            .attributes
            .iter()
            .position(|(n, _)| n == attr)
            .ok_or_else(|| DatasetError::NoSuchAttribute(attr.to_string()))?;
        var.attributes.remove(idx);
        self.bump();
        Ok(())
    }

    fn rename_variable_attr(&mut self, name: &str, old: &str, new: &str) -> DatasetResult<()> {
        validate_name(new)?;
        if old != new && self.variable_attr(name, new).is_some() {
            return Err(DatasetError::NameInUse(new.to_string()));
        }
        let var = self.var_mut(name)?;
        let entry = var
            .attributes
            .iter_mut()
            .find(|(n, _)| n == old)
            .ok_or_else(|| DatasetError::NoSuchAttribute(old.to_string()))?;
        entry.0 = new.to_string();
        self.bump();
        Ok(())
    }

    fn global_attr_names(&self) -> Vec<String> {
        self.attributes.iter().map(|(n, _)| n.clone()).collect()
    }

    fn global_attr(&self, name: &str) -> Option<AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn set_global_attr(&mut self, name: &str, value: AttrValue) -> DatasetResult<()> {
        validate_name(name)?;
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
        self.bump();
        Ok(())
    }

    fn remove_global_attr(&mut self, name: &str) -> DatasetResult<()> {
        let idx = self
            .attributes
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| DatasetError::NoSuchAttribute(name.to_string()))?;
        self.attributes.remove(idx);
        self.bump();
        Ok(())
    }

    fn rename_global_attr(&mut self, old: &str, new: &str) -> DatasetResult<()> {
        validate_name(new)?;
        if old != new && self.global_attr(new).is_some() {
            return Err(DatasetError::NameInUse(new.to_string()));
        }
        let entry = self
            .attributes
            .iter_mut()
            .find(|(n, _)| n == old)
            .ok_or_else(|| DatasetError::NoSuchAttribute(old.to_string()))?;
        entry.0 = new.to_string();
        self.bump();
        Ok(())
    }

    fn dimension_names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name.clone()).collect()
    }

    fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.iter().any(|d| d.name == name)
    }

    fn dimension_size(&self, name: &str) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.size)
    }

    fn create_dimension(&mut self, name: &str, size: usize) -> DatasetResult<()> {
        validate_name(name)?;
        if self.has_dimension(name) {
            return Err(DatasetError::NameInUse(name.to_string()));
        }
        self.dimensions.push(Dimension {
            name: name.to_string(),
            size,
        });
        self.bump();
        Ok(())
    }

    fn rename_dimension(&mut self, old: &str, new: &str) -> DatasetResult<()> {
        validate_name(new)?;
        if old != new && self.has_dimension(new) {
            return Err(DatasetError::NameInUse(new.to_string()));
        }
        let dim = self
            .dimensions
            .iter_mut()
            .find(|d| d.name == old)
            .ok_or_else(|| DatasetError::NoSuchDimension(old.to_string()))?;
        dim.name = new.to_string();
        // Keep every referencing dimension tuple consistent.
        for var in &mut self.variables {
            for d in &mut var.dimensions {
                if d == old {
                    *d = new.to_string();
                }
            }
        }
        self.bump();
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> InMemoryDataset {
        let mut ds = InMemoryDataset::new();
        ds.create_dimension("x", 2).unwrap();
        ds.create_dimension("y", 3).unwrap();
        ds.create_variable("foovar", &["x", "y"]).unwrap();
        ds
    }

    #[test]
    fn create_variable_allocates_zeroed_shape() {
        let ds = dataset();
        assert_eq!(ds.variable_data("foovar").unwrap(), vec![0.0; 6]);
    }

    #[test]
    fn rename_dimension_rewrites_variable_tuples() {
        let mut ds = dataset();
        ds.rename_dimension("x", "lon").unwrap();
        assert_eq!(
            ds.variable_dimensions("foovar").unwrap(),
            vec!["lon".to_string(), "y".to_string()]
        );
        assert_eq!(ds.dimension_size("lon"), Some(2));
        assert!(!ds.has_dimension("x"));
    }

    #[test]
    fn rename_collisions_are_rejected() {
        let mut ds = dataset();
        assert_eq!(
            ds.rename_dimension("x", "y"),
            Err(DatasetError::NameInUse("y".to_string()))
        );
        ds.create_variable("other", &[]).unwrap();
        assert_eq!(
            ds.rename_variable("other", "foovar"),
            Err(DatasetError::NameInUse("foovar".to_string()))
        );
    }

    #[test]
    fn attribute_lifecycle() {
        let mut ds = dataset();
        ds.set_variable_attr("foovar", "units", AttrValue::Text("K".into()))
            .unwrap();
        assert_eq!(
            ds.variable_attr("foovar", "units"),
            Some(AttrValue::Text("K".into()))
        );
        ds.rename_variable_attr("foovar", "units", "unit").unwrap();
        assert_eq!(ds.variable_attr_names("foovar").unwrap(), vec!["unit"]);
        ds.remove_variable_attr("foovar", "unit").unwrap();
        assert!(ds.variable_attr_names("foovar").unwrap().is_empty());
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let mut ds = dataset();
        let r0 = ds.revision();
        ds.set_global_attr("title", AttrValue::Text("t".into()))
            .unwrap();
        let r1 = ds.revision();
        assert!(r1 > r0);
        ds.set_variable_data("foovar", vec![1.0; 6]).unwrap();
        assert!(ds.revision() > r1);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut ds = dataset();
        assert!(matches!(
            ds.create_dimension("", 1),
            Err(DatasetError::InvalidName(_))
        ));
        assert!(matches!(
            ds.set_global_attr("a/b", AttrValue::Int(1)),
            Err(DatasetError::InvalidName(_))
        ));
    }
}
