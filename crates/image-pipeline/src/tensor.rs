//! Model input tensor

use ndarray::Array4;

use crate::ImageProcessingError;

/// Dense `f32` tensor in NHWC layout
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl InputTensor {
    /// Create a tensor from a shape and row-major data
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, ImageProcessingError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ImageProcessingError::Preprocess(format!(
                "tensor data has {} elements, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    /// Take ownership of an ndarray buffer
    pub fn from_array(array: Array4<f32>) -> Self {
        let (n, h, w, c) = array.dim();
        // Logical iteration order is row-major regardless of memory layout
        let data = array.iter().copied().collect();
        Self {
            shape: [n, h, w, c],
            data,
        }
    }

    /// Tensor shape `[batch, height, width, channels]`
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major element data
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Channel values of the pixel at (y, x) in batch 0
    pub fn pixel(&self, y: usize, x: usize) -> Option<&[f32]> {
        let [_, h, w, c] = self.shape;
        if y >= h || x >= w {
            return None;
        }
        let start = (y * w + x) * c;
        self.data.get(start..start + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_element_count() {
        assert!(InputTensor::new([1, 2, 2, 3], vec![0.0; 12]).is_ok());
        assert!(matches!(
            InputTensor::new([1, 2, 2, 3], vec![0.0; 11]),
            Err(ImageProcessingError::Preprocess(_))
        ));
    }

    #[test]
    fn test_from_array_preserves_nhwc_order() {
        let array = Array4::from_shape_fn((1, 2, 3, 3), |(_, y, x, c)| (y * 100 + x * 10 + c) as f32);
        let tensor = InputTensor::from_array(array);
        assert_eq!(tensor.shape(), &[1, 2, 3, 3]);
        assert_eq!(tensor.pixel(1, 2), Some(&[120.0, 121.0, 122.0][..]));
        assert_eq!(tensor.pixel(2, 0), None);
    }
}
