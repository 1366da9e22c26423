#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use crate::acquisition::common::error::{CameraError, Result};
    use crate::acquisition::config::{AcquisitionConfig, WriteFailurePolicy};
    use crate::acquisition::convert::{PixelFormatConverter, StandardConverter};
    use crate::acquisition::device::{
        CameraDevice, CapturedFrame, DeviceInfo, NodeInfo, ParameterValue,
    };
    use crate::acquisition::layout::{ElementType, FrameBuffer, FrameLayout};
    use crate::acquisition::naming::{PathTemplate, prepare_output_dir};
    use crate::acquisition::pipeline::{AcquisitionPipeline, FrameStatus};
    use crate::acquisition::pixel_format::PixelFormat;
    use crate::acquisition::runner::SaveSession;
    use crate::acquisition::simulated::{
        FrameOutcome, SimulatedCamera, SimulatedTransport, test_pattern_sample,
    };
    use crate::acquisition::tiff::{StandardTiffWriter, TiffCompression, TiffWriter};

    /// Wraps a simulated camera and records grab engine calls.
    struct RecordingDevice {
        inner: SimulatedCamera,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingDevice {
        fn new(camera: SimulatedCamera) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let mut inner = camera;
            inner.open().unwrap();
            (Self { inner, calls: calls.clone() }, calls)
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl CameraDevice for RecordingDevice {
        fn info(&self) -> &DeviceInfo {
            self.inner.info()
        }

        fn open(&mut self) -> Result<()> {
            self.inner.open()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }

        fn node(&self, name: &str) -> Result<NodeInfo> {
            self.inner.node(name)
        }

        fn node_names(&self) -> Result<Vec<String>> {
            self.inner.node_names()
        }

        fn read_node(&self, name: &str) -> Result<ParameterValue> {
            self.inner.read_node(name)
        }

        fn write_node(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
            self.inner.write_node(name, value)
        }

        fn start_grab(&mut self, num_frames: usize) -> Result<()> {
            self.record("start_grab");
            self.inner.start_grab(num_frames)
        }

        fn retrieve_frame(&mut self, timeout: Duration) -> Result<CapturedFrame> {
            self.record("retrieve_frame");
            self.inner.retrieve_frame(timeout)
        }

        fn stop_grab(&mut self) -> Result<()> {
            self.record("stop_grab");
            self.inner.stop_grab()
        }
    }

    struct CountingConverter {
        calls: Arc<Mutex<usize>>,
    }

    impl PixelFormatConverter for CountingConverter {
        fn convert(&self, source: &CapturedFrame, target: PixelFormat) -> Result<CapturedFrame> {
            *self.calls.lock().unwrap() += 1;
            StandardConverter.convert(source, target)
        }
    }

    struct MockWriter {
        fail_for: Vec<u64>,
        written: Arc<Mutex<Vec<u64>>>,
    }

    impl TiffWriter for MockWriter {
        fn write_tiff(&self, frame: &CapturedFrame, output: &mut dyn Write, _config: &AcquisitionConfig) -> Result<()> {
            if self.fail_for.contains(&frame.image_number) {
                return Err(CameraError::Encode {
                    path: None,
                    message: "Mock encode error".to_string(),
                });
            }
            output.write_all(b"mock")?;
            self.written.lock().unwrap().push(frame.image_number);
            Ok(())
        }
    }

    fn mono8(width: usize, height: usize) -> SimulatedCamera {
        SimulatedCamera::new("sim-mono", width, height, PixelFormat::Mono8)
    }

    fn counting_pipeline(calls: Arc<Mutex<usize>>) -> AcquisitionPipeline<CountingConverter, StandardTiffWriter> {
        AcquisitionPipeline::with_custom(
            CountingConverter { calls },
            StandardTiffWriter,
            AcquisitionConfig::default(),
        )
    }

    fn assert_frame_matches(buffer: &FrameBuffer, frame: usize, image_number: u64) {
        let layout = buffer.layout();
        for row in 0..layout.height {
            for col in 0..layout.width {
                let expected = test_pattern_sample(image_number, row, col, 0, 8) as f64;
                assert_eq!(
                    buffer.get(row, col, 0, frame),
                    Some(expected),
                    "frame {frame} at ({row}, {col})"
                );
            }
        }
    }

    #[test]
    fn test_config_builder() {
        let config = AcquisitionConfig::builder()
            .timeout(Duration::from_millis(250))
            .verbose(true)
            .compression(TiffCompression::Lzw)
            .predictor(Some(2))
            .write_failure(WriteFailurePolicy::Abort)
            .build();

        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.verbose);
        assert_eq!(config.compression, TiffCompression::Lzw);
        assert_eq!(config.predictor, Some(2));
        assert_eq!(config.write_failure, WriteFailurePolicy::Abort);

        let default = AcquisitionConfig::default();
        assert_eq!(default.timeout, Duration::from_millis(5000));
        assert_eq!(default.write_failure, WriteFailurePolicy::Skip);
    }

    #[test]
    fn test_same_format_bypasses_converter() {
        let calls = Arc::new(Mutex::new(0));
        let pipeline = counting_pipeline(calls.clone());
        let (mut device, _) = RecordingDevice::new(mono8(4, 3));

        let capture = pipeline
            .capture_images(&mut device, 3, Some(PixelFormat::Mono8))
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(capture.report.is_complete());
        assert_eq!(capture.buffer.element_type(), ElementType::U8);
        assert_eq!(capture.buffer.layout().dims(), [3, 4, 1, 3]);
        for frame in 0..3 {
            assert_frame_matches(&capture.buffer, frame, frame as u64 + 1);
        }
    }

    #[test]
    fn test_default_target_is_device_format() {
        let calls = Arc::new(Mutex::new(0));
        let pipeline = counting_pipeline(calls.clone());
        let (mut device, _) = RecordingDevice::new(mono8(4, 3));

        let capture = pipeline.capture_images(&mut device, 2, None).unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(capture.buffer.element_type(), ElementType::U8);
    }

    #[test]
    fn test_different_format_converts_every_frame() {
        let calls = Arc::new(Mutex::new(0));
        let pipeline = counting_pipeline(calls.clone());
        let (mut device, _) = RecordingDevice::new(mono8(4, 3));

        let capture = pipeline
            .capture_images(&mut device, 3, Some(PixelFormat::Mono16))
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(capture.buffer.element_type(), ElementType::U16);
        // 8-bit full scale maps to 16-bit full scale
        let first = test_pattern_sample(1, 0, 0, 0, 8) as f64;
        assert_eq!(capture.buffer.get(0, 0, 0, 0), Some(first * 257.0));
    }

    #[test]
    fn test_bayer_to_rgb_capture_is_band_planar() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let camera = SimulatedCamera::new("sim-color", 6, 4, PixelFormat::BayerRG8);
        let (mut device, _) = RecordingDevice::new(camera);

        let capture = pipeline
            .capture_images(&mut device, 2, Some(PixelFormat::RGB8))
            .unwrap();

        assert_eq!(capture.buffer.layout().dims(), [4, 6, 3, 2]);
        assert_eq!(capture.buffer.as_u8().map(|d| d.len()), Some(4 * 6 * 3 * 2));
        assert!(capture.report.is_complete());
    }

    #[test]
    fn test_failed_grab_is_skipped() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let camera = mono8(5, 4).with_script(vec![
            FrameOutcome::Deliver,
            FrameOutcome::Deliver,
            FrameOutcome::GrabFailed,
            FrameOutcome::Deliver,
            FrameOutcome::Deliver,
        ]);
        let (mut device, calls) = RecordingDevice::new(camera);

        let capture = pipeline.capture_images(&mut device, 5, None).unwrap();

        assert_eq!(capture.report.failed_frames(), vec![2]);
        assert_eq!(capture.report.succeeded(), 4);
        assert_eq!(capture.report.statuses[2], FrameStatus::Failed);
        // image numbers keep counting across the failed grab
        assert_frame_matches(&capture.buffer, 0, 1);
        assert_frame_matches(&capture.buffer, 1, 2);
        assert_frame_matches(&capture.buffer, 3, 4);
        assert_frame_matches(&capture.buffer, 4, 5);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| *c == "retrieve_frame").count(), 5);
        assert_eq!(calls.last().map(String::as_str), Some("stop_grab"));
    }

    #[test]
    fn test_failed_grab_keeps_previous_slot_contents() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let layout = FrameLayout::new(4, 5, 1, 5).unwrap();
        let mut buffer = FrameBuffer::allocate(layout, ElementType::U8);

        let (mut first, _) = RecordingDevice::new(mono8(5, 4));
        let report = pipeline.capture_into(&mut first, &mut buffer, None).unwrap();
        assert!(report.is_complete());

        let camera = mono8(5, 4)
            .with_first_image_number(11)
            .with_script(vec![
                FrameOutcome::Deliver,
                FrameOutcome::Deliver,
                FrameOutcome::GrabFailed,
                FrameOutcome::Deliver,
                FrameOutcome::Deliver,
            ]);
        let (mut second, _) = RecordingDevice::new(camera);
        let report = pipeline.capture_into(&mut second, &mut buffer, None).unwrap();

        assert_eq!(report.failed_frames(), vec![2]);
        // slot 2 still holds image 3 from the first run
        assert_frame_matches(&buffer, 2, 3);
        assert_frame_matches(&buffer, 0, 11);
        assert_frame_matches(&buffer, 1, 12);
        assert_frame_matches(&buffer, 3, 14);
        assert_frame_matches(&buffer, 4, 15);
    }

    #[test]
    fn test_timeout_aborts_session_and_stops_grab() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let camera = mono8(5, 4).with_script(vec![
            FrameOutcome::Deliver,
            FrameOutcome::Deliver,
            FrameOutcome::Deliver,
            FrameOutcome::Timeout,
        ]);
        let (mut device, calls) = RecordingDevice::new(camera);
        let layout = FrameLayout::new(4, 5, 1, 5).unwrap();
        let mut buffer = FrameBuffer::allocate(layout, ElementType::U8);

        let result = pipeline.capture_into(&mut device, &mut buffer, None);

        assert!(matches!(result, Err(CameraError::Timeout { frame: 3, .. })));
        for frame in 0..3 {
            assert_frame_matches(&buffer, frame, frame as u64 + 1);
        }
        let data = buffer.as_u8().unwrap();
        let frame_len = layout.frame_len();
        assert!(data[3 * frame_len..].iter().all(|v| *v == 0));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| *c == "retrieve_frame").count(), 4);
        assert_eq!(calls.last().map(String::as_str), Some("stop_grab"));
        assert_eq!(calls.iter().filter(|c| *c == "stop_grab").count(), 1);
    }

    #[test]
    fn test_configuration_errors_before_grab() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let (mut device, calls) = RecordingDevice::new(mono8(4, 3));

        let result = pipeline.capture_images(&mut device, 0, None);
        assert!(matches!(result, Err(CameraError::InvalidFrameCount(0))));

        let result = pipeline.capture_images(&mut device, 2, Some(PixelFormat::Mono12));
        assert!(matches!(result, Err(CameraError::UnsupportedConversion { .. })));

        let result = pipeline.capture_images(&mut device, 2, Some(PixelFormat::Mono12p));
        assert!(result.is_err());

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_dimensions_rejected_before_grab() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("empty")).unwrap();
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let (mut device, calls) = RecordingDevice::new(mono8(0, 3));

        let result = pipeline.capture_images(&mut device, 1, None);
        assert!(matches!(result, Err(CameraError::InvalidDimensions(0, 3))));

        let result = pipeline.save_images(&mut device, &template, 1, None);
        assert!(matches!(result, Err(CameraError::InvalidDimensions(0, 3))));

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path().join("empty")).unwrap().count(), 0);
    }

    #[test]
    fn test_capture_into_rejects_mismatched_buffer() {
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let (mut device, calls) = RecordingDevice::new(mono8(4, 3));

        let layout = FrameLayout::new(3, 4, 1, 2).unwrap();
        let mut wrong_type = FrameBuffer::allocate(layout, ElementType::U16);
        let result = pipeline.capture_into(&mut device, &mut wrong_type, None);
        assert!(matches!(result, Err(CameraError::BufferMismatch(_))));

        let layout = FrameLayout::new(4, 4, 1, 2).unwrap();
        let mut wrong_size = FrameBuffer::allocate(layout, ElementType::U8);
        let result = pipeline.capture_into(&mut device, &mut wrong_size, None);
        assert!(matches!(result, Err(CameraError::BufferMismatch(_))));

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_save_names_files_by_image_number() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("out")).unwrap();
        let pipeline = AcquisitionPipeline::new(AcquisitionConfig::default());
        let (mut device, _) = RecordingDevice::new(mono8(4, 3).with_first_image_number(7));

        let report = pipeline.save_images(&mut device, &template, 2, None).unwrap();

        let expected = vec![
            dir.path().join("out").join("frame_0007.tif"),
            dir.path().join("out").join("frame_0008.tif"),
        ];
        assert_eq!(report.written, expected);
        for path in &expected {
            assert!(path.is_file());
        }
    }

    #[test]
    fn test_save_skips_failed_grabs() {
        let dir = tempfile::tempdir().unwrap();
        let template = PathTemplate::parse(&format!("{}/img_%03d.tif", dir.path().display())).unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = AcquisitionPipeline::with_custom(
            StandardConverter,
            MockWriter { fail_for: Vec::new(), written: written.clone() },
            AcquisitionConfig::default(),
        );
        let camera = mono8(4, 3).with_script(vec![FrameOutcome::Deliver, FrameOutcome::GrabFailed]);
        let (mut device, _) = RecordingDevice::new(camera);

        let report = pipeline.save_images(&mut device, &template, 3, None).unwrap();

        assert_eq!(report.failed_grabs, vec![1]);
        assert_eq!(*written.lock().unwrap(), vec![1, 3]);
        assert!(!dir.path().join("img_002.tif").exists());
    }

    #[test]
    fn test_write_failure_skip_policy() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("skip")).unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = AcquisitionPipeline::with_custom(
            StandardConverter,
            MockWriter { fail_for: vec![2], written: written.clone() },
            AcquisitionConfig::builder()
                .write_failure(WriteFailurePolicy::Skip)
                .build(),
        );
        let (mut device, _) = RecordingDevice::new(mono8(4, 3));

        let report = pipeline.save_images(&mut device, &template, 3, None).unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(report.failed_writes.len(), 1);
        assert_eq!(report.failed_writes[0].path, template.render(2));
        assert!(report.failed_writes[0].error.contains("Mock encode error"));
        assert_eq!(*written.lock().unwrap(), vec![1, 3]);
        // the disk agrees with the report
        assert!(!template.render(2).exists());
        assert!(template.render(1).is_file());
        assert!(template.render(3).is_file());
    }

    #[test]
    fn test_write_failure_abort_policy() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("abort")).unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = AcquisitionPipeline::with_custom(
            StandardConverter,
            MockWriter { fail_for: vec![2], written: written.clone() },
            AcquisitionConfig::builder()
                .write_failure(WriteFailurePolicy::Abort)
                .build(),
        );
        let (mut device, calls) = RecordingDevice::new(mono8(4, 3));

        let result = pipeline.save_images(&mut device, &template, 3, None);

        match result {
            Err(CameraError::Encode { path, .. }) => assert_eq!(path, Some(template.render(2))),
            other => panic!("expected encode error, got {other:?}"),
        }
        assert_eq!(*written.lock().unwrap(), vec![1]);
        assert!(!template.render(2).exists());
        assert_eq!(calls.lock().unwrap().last().map(String::as_str), Some("stop_grab"));
    }

    #[test]
    fn test_missing_output_directory_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = PathTemplate::parse(&format!("{}/missing/f_%04d.tif", dir.path().display())).unwrap();
        let pipeline = AcquisitionPipeline::new(
            AcquisitionConfig::builder()
                .write_failure(WriteFailurePolicy::Abort)
                .build(),
        );
        let (mut device, _) = RecordingDevice::new(mono8(4, 3));

        let result = pipeline.save_images(&mut device, &template, 1, None);
        assert!(matches!(result, Err(CameraError::File(_))));
    }

    #[test]
    fn test_joined_session_surfaces_report() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("joined")).unwrap();
        let transport = Arc::new(SimulatedTransport::new(vec![mono8(4, 3)]));

        let report = SaveSession::new(transport, 0, template.clone(), 3)
            .run(false)
            .unwrap()
            .unwrap();

        assert_eq!(report.written.len(), 3);
        assert!(template.render(3).is_file());
    }

    #[test]
    fn test_joined_session_surfaces_errors() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path()).unwrap();
        let transport = Arc::new(SimulatedTransport::new(vec![mono8(4, 3)]));

        let result = SaveSession::new(transport, 4, template, 1).run(false);
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_detached_session_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let template = prepare_output_dir(dir.path().join("detached")).unwrap();
        let camera = mono8(4, 3).with_frame_delay(Duration::from_millis(5));
        let transport = Arc::new(SimulatedTransport::new(vec![camera]));

        let result = SaveSession::new(transport, 0, template.clone(), 3)
            .run(true)
            .unwrap();
        assert!(result.is_none());

        let deadline = Instant::now() + Duration::from_secs(10);
        let last = template.render(3);
        let written = |path: &std::path::Path| {
            std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
        };
        while !written(&last) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(written(&last));
    }
}
