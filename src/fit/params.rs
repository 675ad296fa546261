use serde::{Deserialize, Serialize};

/// A single fit parameter with optional bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
    pub stderr: Option<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
            stderr: None,
        }
    }

    /// Value clipped into `[min, max]`.
    pub fn clamped(&self) -> f64 {
        let mut value = self.value;
        if value < self.min {
            value = self.min;
        }
        if value > self.max {
            value = self.max;
        }
        value
    }
}

/// Ordered parameter set; the order matches the model's parameter names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    params: Vec<Parameter>,
}

impl FitParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates unbounded parameters with value 1 for every name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            params: names.iter().map(|n| Parameter::new(n.as_ref(), 1.0)).collect(),
        }
    }

    pub fn add(&mut self, parameter: Parameter) {
        match self.params.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.params.push(parameter),
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// Value of `name`, NaN when the parameter does not exist.
    pub fn value(&self, name: &str) -> f64 {
        self.get(name).map(|p| p.value).unwrap_or(f64::NAN)
    }

    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|p| p.stderr)
    }

    /// Sets a value, leaving the bounds alone. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: f64) {
        if let Some(p) = self.get_mut(name) {
            p.value = value;
        }
    }

    pub fn set_bounded(&mut self, name: &str, value: f64, min: f64, max: f64) {
        if let Some(p) = self.get_mut(name) {
            p.value = value;
            p.min = min;
            p.max = max;
        }
    }

    pub fn set_min(&mut self, name: &str, value: f64, min: f64) {
        self.set_bounded(name, value, min, f64::INFINITY);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub fn nvarys(&self) -> usize {
        self.params.iter().filter(|p| p.vary).count()
    }

    /// Overrides values and bounds with those of `update` for the names both share.
    pub fn substitute(&mut self, update: &FitParameters) {
        for new in update.iter() {
            if let Some(p) = self.get_mut(&new.name) {
                *p = new.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_keep_order_and_bounds() {
        let mut params = FitParameters::from_names(&["amplitude", "frequency", "offset"]);
        params.set_bounded("frequency", 2.0, 0.0, 10.0);
        params.set("unknown", 5.0);

        assert_eq!(params.names(), vec!["amplitude", "frequency", "offset"]);
        assert_eq!(params.values(), vec![1.0, 2.0, 1.0]);
        assert_eq!(params.get("frequency").unwrap().max, 10.0);
        assert!(params.value("unknown").is_nan());
        assert_eq!(params.nvarys(), 3);
    }

    #[test]
    fn test_clamped_and_substitute() {
        let mut params = FitParameters::from_names(&["beta"]);
        params.set_bounded("beta", 12.0, 0.0, 10.0);
        assert_eq!(params.get("beta").unwrap().clamped(), 10.0);

        let mut update = FitParameters::new();
        let mut fixed = Parameter::new("beta", 1.5);
        fixed.vary = false;
        update.add(fixed);
        params.substitute(&update);
        assert_eq!(params.value("beta"), 1.5);
        assert_eq!(params.nvarys(), 0);
    }
}
